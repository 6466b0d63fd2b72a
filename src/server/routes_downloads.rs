//! `/api/downloads`: authenticated, quota-gated proxy access.

use crate::downloads::QuotaDecision;
use crate::server::auth::AuthUser;
use crate::server::error::AppError;
use crate::server::routes_proxy::{current_request_id, forward_to_upstream};
use crate::server::AppContext;
use axum::{
    body::Body,
    extract::{rejection::QueryRejection, Query, State},
    http::Request,
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use hivestream_proxy::validate_target;
use serde::Deserialize;
use serde_json::json;

pub fn download_routes() -> Router<AppContext> {
    Router::new()
        .route("/downloads", get(download))
        .route("/downloads/mine", get(list_mine))
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub url: Option<String>,
    pub content_id: Option<String>,
}

/// `GET /api/downloads?url=...&content_id=...`
pub async fn download(
    State(ctx): State<AppContext>,
    Extension(user): Extension<AuthUser>,
    query: Result<Query<DownloadQuery>, QueryRejection>,
    request: Request<Body>,
) -> Response {
    let (parts, _body) = request.into_parts();
    let request_id = current_request_id(&parts);

    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => {
            return AppError::BadRequest(format!("Invalid query string: {}", rejection.body_text()))
                .with_request_id(request_id)
                .into_response();
        }
    };

    let (Some(url), Some(content_id)) = (
        query.url.filter(|s| !s.trim().is_empty()),
        query.content_id.filter(|s| !s.trim().is_empty()),
    ) else {
        return AppError::BadRequest("Parameters 'url' and 'content_id' are required.".into())
            .with_request_id(request_id)
            .into_response();
    };

    // A bad URL must not burn quota.
    let target = match validate_target(Some(&url)) {
        Ok(target) => target,
        Err(e) => return AppError::from(e).with_request_id(request_id).into_response(),
    };

    match ctx.downloads.try_record(&user.id, &content_id).await {
        Ok(QuotaDecision::Granted { used }) => {
            tracing::info!(user = %user.id, content_id = %content_id, used, "Download granted");
        }
        Ok(QuotaDecision::Exceeded { limit }) => {
            tracing::info!(user = %user.id, content_id = %content_id, limit, "Download refused");
            return AppError::Forbidden(format!("Daily limit of {limit} downloads reached."))
                .with_request_id(request_id)
                .into_response();
        }
        Err(e) => return AppError::Internal(e).with_request_id(request_id).into_response(),
    }

    forward_to_upstream(&ctx, target, &parts, request_id).await
}

/// `GET /api/downloads/mine`
pub async fn list_mine(
    State(ctx): State<AppContext>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<serde_json::Value>, AppError> {
    let records = ctx.downloads.list(&user.id).await?;
    Ok(Json(json!({ "data": records })))
}
