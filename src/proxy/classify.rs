//! Request classification for the media proxy

use url::Url;

/// Container format of a binary media segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Ts,
    Mp4,
}

impl Container {
    /// Content type forced onto the client response regardless of what the
    /// upstream declared.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Ts => "video/mp2t",
            Self::Mp4 => "video/mp4",
        }
    }

    /// MP4 targets skip upstream certificate verification for legacy players
    /// on self-signed media hosts.
    pub fn skip_cert_verify(&self) -> bool {
        matches!(self, Self::Mp4)
    }
}

/// Handling strategy for a proxied resource.
///
/// Decided once per request from the path suffix and threaded through; it is
/// the single source of truth for content type, rewriting and TLS policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Manifest,
    Segment(Container),
    Opaque,
}

/// Classify a target URL by the suffix of its path. Case-sensitive; unknown
/// or missing suffixes are opaque.
pub fn classify(url: &Url) -> ResourceKind {
    let path = url.path();
    if path.ends_with(".m3u8") {
        ResourceKind::Manifest
    } else if path.ends_with(".ts") {
        ResourceKind::Segment(Container::Ts)
    } else if path.ends_with(".mp4") {
        ResourceKind::Segment(Container::Mp4)
    } else {
        ResourceKind::Opaque
    }
}
