//! Content sniffing for terminal upstream responses.
//!
//! Classification is an ordered rule table. The first matching rule wins, so
//! manifest rules come first: a manifest content type beats a video URL
//! suffix, and either manifest signal alone is enough.

use url::Url;

/// How a terminal response is delivered to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentClass {
    /// HLS or DASH manifest; buffered and rewritten.
    Manifest,
    /// Video file; streamed through.
    Video,
    /// Anything else; streamed through.
    Opaque,
}

impl ContentClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manifest => "manifest",
            Self::Video => "video",
            Self::Opaque => "opaque",
        }
    }

    /// Whether the body must be buffered before it is sent.
    pub fn needs_rewrite(&self) -> bool {
        matches!(self, Self::Manifest)
    }
}

impl std::fmt::Display for ContentClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single sniffing signal. Inputs are lowercased before matching.
#[derive(Debug, Clone, Copy)]
enum Signal {
    ContentTypeContains(&'static str),
    ContentTypePrefix(&'static str),
    PathSuffix(&'static str),
}

impl Signal {
    fn matches(&self, content_type: &str, path: &str) -> bool {
        match self {
            Self::ContentTypeContains(needle) => content_type.contains(needle),
            Self::ContentTypePrefix(prefix) => content_type.starts_with(prefix),
            Self::PathSuffix(suffix) => path.ends_with(suffix),
        }
    }
}

struct Rule {
    class: ContentClass,
    signal: Signal,
}

const fn rule(class: ContentClass, signal: Signal) -> Rule {
    Rule { class, signal }
}

const RULES: &[Rule] = &[
    rule(
        ContentClass::Manifest,
        Signal::ContentTypeContains("application/vnd.apple.mpegurl"),
    ),
    rule(
        ContentClass::Manifest,
        Signal::ContentTypeContains("application/x-mpegurl"),
    ),
    rule(
        ContentClass::Manifest,
        Signal::ContentTypeContains("application/dash+xml"),
    ),
    rule(ContentClass::Manifest, Signal::PathSuffix(".m3u8")),
    rule(ContentClass::Manifest, Signal::PathSuffix(".mpd")),
    rule(ContentClass::Video, Signal::ContentTypePrefix("video/")),
    rule(ContentClass::Video, Signal::PathSuffix(".mp4")),
    rule(ContentClass::Video, Signal::PathSuffix(".webm")),
    rule(ContentClass::Video, Signal::PathSuffix(".mov")),
    rule(ContentClass::Video, Signal::PathSuffix(".avi")),
    rule(ContentClass::Video, Signal::PathSuffix(".mkv")),
    rule(ContentClass::Video, Signal::PathSuffix(".flv")),
];

/// Classify a response from its `Content-Type` and the requested URL.
///
/// Only the URL path is considered for suffixes; query and fragment are
/// ignored.
pub fn classify(content_type: Option<&str>, target: &Url) -> ContentClass {
    let content_type = content_type.unwrap_or_default().trim().to_ascii_lowercase();
    let path = target.path().to_ascii_lowercase();

    RULES
        .iter()
        .find(|r| r.signal.matches(&content_type, &path))
        .map(|r| r.class)
        .unwrap_or(ContentClass::Opaque)
}
