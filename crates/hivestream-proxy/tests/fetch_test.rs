//! Fetcher and proxy pipeline tests against a mock upstream.

use std::time::Duration;

use http_body_util::BodyExt;
use hivestream_proxy::fetch::DEFAULT_USER_AGENT;
use hivestream_proxy::{
    Fetcher, FetcherConfig, MediaProxy, ProxyError, ProxyRequest, MAX_REDIRECTS,
};
use reqwest::Method;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher() -> Fetcher {
    Fetcher::new(&FetcherConfig::default()).expect("client builds")
}

fn get(server: &MockServer, p: &str) -> ProxyRequest {
    ProxyRequest::new(
        Url::parse(&format!("{}{p}", server.uri())).unwrap(),
        Method::GET,
    )
}

/// Mount `/hop/0 -> /hop/1 -> ... -> /hop/{hops}` ending in a 200.
async fn mount_chain(server: &MockServer, hops: usize) {
    for i in 0..hops {
        Mock::given(method("GET"))
            .and(path(format!("/hop/{i}")))
            .respond_with(
                ResponseTemplate::new(302).insert_header("Location", format!("/hop/{}", i + 1)),
            )
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path(format!("/hop/{hops}")))
        .respond_with(ResponseTemplate::new(200).set_body_string("done"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn chain_of_five_redirects_succeeds() {
    let server = MockServer::start().await;
    mount_chain(&server, MAX_REDIRECTS as usize).await;

    let mut request = get(&server, "/hop/0");
    let upstream = fetcher().fetch(&mut request).await.unwrap();

    assert_eq!(upstream.status(), 200);
    assert_eq!(request.redirect_count(), MAX_REDIRECTS);
    assert_eq!(upstream.final_url().path(), "/hop/5");
    assert_eq!(upstream.into_inner().text().await.unwrap(), "done");
}

#[tokio::test]
async fn chain_of_six_redirects_fails() {
    let server = MockServer::start().await;
    mount_chain(&server, MAX_REDIRECTS as usize + 1).await;

    let mut request = get(&server, "/hop/0");
    let err = fetcher().fetch(&mut request).await.unwrap_err();

    assert!(
        matches!(err, ProxyError::TooManyRedirects { limit: 5, .. }),
        "{err:?}"
    );
    assert_eq!(request.redirect_count(), MAX_REDIRECTS);
}

#[tokio::test]
async fn absolute_redirect_to_other_host_keeps_headers() {
    let origin = MockServer::start().await;
    let mirror = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/video.mp4"))
        .respond_with(
            ResponseTemplate::new(301)
                .insert_header("Location", format!("{}/real/video.mp4", mirror.uri())),
        )
        .mount(&origin)
        .await;

    // The header set is computed once from the original target.
    Mock::given(method("GET"))
        .and(path("/real/video.mp4"))
        .and(header("referer", origin.uri().as_str()))
        .and(header("origin", origin.uri().as_str()))
        .and(header("range", "bytes=0-3"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(vec![1u8, 2, 3, 4]))
        .expect(1)
        .mount(&mirror)
        .await;

    let mut client_headers = reqwest::header::HeaderMap::new();
    client_headers.insert("range", "bytes=0-3".parse().unwrap());
    let mut request = get(&origin, "/video.mp4").with_client_headers(&client_headers);

    let upstream = fetcher().fetch(&mut request).await.unwrap();
    assert_eq!(upstream.status(), 206);
    assert_eq!(request.redirect_count(), 1);
    assert_eq!(upstream.final_url().as_str(), format!("{}/real/video.mp4", mirror.uri()));
}

#[tokio::test]
async fn spoofed_referer_origin_and_user_agent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/clip.mp4"))
        .and(header("referer", server.uri().as_str()))
        .and(header("origin", server.uri().as_str()))
        .and(header("user-agent", DEFAULT_USER_AGENT))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut request = get(&server, "/clip.mp4");
    let upstream = fetcher().fetch(&mut request).await.unwrap();
    assert_eq!(upstream.status(), 200);
}

#[tokio::test]
async fn error_statuses_pass_through() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing.mp4"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not here"))
        .mount(&server)
        .await;

    let mut request = get(&server, "/missing.mp4");
    let upstream = fetcher().fetch(&mut request).await.unwrap();
    assert_eq!(upstream.status(), 404);
    assert_eq!(request.redirect_count(), 0);
}

#[tokio::test]
async fn redirect_without_location_is_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cached"))
        .respond_with(ResponseTemplate::new(304))
        .mount(&server)
        .await;

    let mut request = get(&server, "/cached");
    let upstream = fetcher().fetch(&mut request).await.unwrap();
    assert_eq!(upstream.status(), 304);
}

#[tokio::test]
async fn redirect_to_disallowed_scheme_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/out"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", "ftp://files.example.com/v.mp4"),
        )
        .mount(&server)
        .await;

    let mut request = get(&server, "/out");
    let err = fetcher().fetch(&mut request).await.unwrap_err();
    assert!(matches!(err, ProxyError::UpstreamProtocolError { .. }), "{err:?}");
}

#[tokio::test]
async fn head_method_is_preserved() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/video.mp4"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut request = ProxyRequest::new(
        Url::parse(&format!("{}/video.mp4", server.uri())).unwrap(),
        Method::HEAD,
    );
    let upstream = fetcher().fetch(&mut request).await.unwrap();
    assert_eq!(upstream.status(), 200);
}

#[tokio::test]
async fn slow_hop_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(800)))
        .mount(&server)
        .await;

    let config = FetcherConfig {
        hop_timeout: Duration::from_millis(100),
        ..FetcherConfig::default()
    };
    let fetcher = Fetcher::new(&config).unwrap();

    let mut request = get(&server, "/slow");
    let err = fetcher.fetch(&mut request).await.unwrap_err();
    assert!(matches!(err, ProxyError::UpstreamTimeout { .. }), "{err:?}");
    assert_eq!(err.http_status(), 500);
}

#[tokio::test]
async fn closed_port_is_unreachable() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let mut request = ProxyRequest::new(
        Url::parse(&format!("http://127.0.0.1:{port}/video.mp4")).unwrap(),
        Method::GET,
    );
    let err = fetcher().fetch(&mut request).await.unwrap_err();
    match err {
        ProxyError::UpstreamUnreachable { url, message } => {
            assert!(url.contains(&port.to_string()));
            assert!(!message.is_empty());
        }
        other => panic!("expected UpstreamUnreachable, got {other:?}"),
    }
}

#[tokio::test]
async fn proxy_rewrites_manifest_and_drops_length() {
    let server = MockServer::start().await;
    let playlist = "#EXTM3U\n#EXTINF:6.0,\nhttps://cdn.example.com/seg0.ts\n#EXTINF:6.0,\nseg1.ts\n";
    Mock::given(method("GET"))
        .and(path("/live/index.m3u8"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "application/vnd.apple.mpegurl")
                .set_body_string(playlist),
        )
        .mount(&server)
        .await;

    let proxy = MediaProxy::new(&FetcherConfig::default()).unwrap();
    let response = proxy
        .proxy(
            get(&server, "/live/index.m3u8"),
            "https://proxy.example.com/api/proxy",
        )
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert!(response.headers().get("content-length").is_none());
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let body = String::from_utf8(body.to_vec()).unwrap();
    assert_eq!(
        body,
        "#EXTM3U\n#EXTINF:6.0,\nhttps://proxy.example.com/api/proxy?url=https%3A%2F%2Fcdn.example.com%2Fseg0.ts\n#EXTINF:6.0,\nseg1.ts\n"
    );
}

#[tokio::test]
async fn proxy_streams_opaque_bytes_unchanged() {
    let server = MockServer::start().await;
    let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    Mock::given(method("GET"))
        .and(path("/blob"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "application/octet-stream")
                .set_body_bytes(payload.clone()),
        )
        .mount(&server)
        .await;

    let proxy = MediaProxy::new(&FetcherConfig::default()).unwrap();
    let response = proxy
        .proxy(get(&server, "/blob"), "https://proxy.example.com/api/proxy")
        .await
        .unwrap();

    assert_eq!(
        response.headers().get("content-length").unwrap(),
        payload.len().to_string().as_str()
    );
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body.len(), payload.len());
    assert!(body[..] == payload[..]);
}
