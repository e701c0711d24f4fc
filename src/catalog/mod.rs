//! Anime catalog lookups
//!
//! The catalog itself lives in an external scraping service; this module owns
//! the call signatures and the parameter vocabulary, and treats every result
//! as opaque JSON.

pub mod anix;

pub use anix::AnixCatalog;

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::str::FromStr;

/// Streaming servers a client may select for episode sources.
///
/// The mapping from client-supplied names is closed: unknown names are a
/// validation error, never a silent fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamingServer {
    BuiltIn,
    StreamWish,
    Mp4Upload,
    VidHide,
}

impl StreamingServer {
    /// Canonical wire name, also used in cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BuiltIn => "vidstream",
            Self::StreamWish => "streamwish",
            Self::Mp4Upload => "mp4upload",
            Self::VidHide => "vidhide",
        }
    }
}

/// Unrecognized streaming-server name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownServer;

impl FromStr for StreamingServer {
    type Err = UnknownServer;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "vidstream" => Ok(Self::BuiltIn),
            "streamwish" => Ok(Self::StreamWish),
            "mp4upload" => Ok(Self::Mp4Upload),
            "vidhide" => Ok(Self::VidHide),
            _ => Err(UnknownServer),
        }
    }
}

/// Audio track selection for episode lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioKind {
    #[default]
    Sub,
    Dub,
}

impl AudioKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sub => "sub",
            Self::Dub => "dub",
        }
    }
}

/// Audio kind other than `sub` or `dub`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidAudioKind;

impl FromStr for AudioKind {
    type Err = InvalidAudioKind;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "sub" => Ok(Self::Sub),
            "dub" => Ok(Self::Dub),
            _ => Err(InvalidAudioKind),
        }
    }
}

/// Producer surface backing the catalog endpoints. Implementations are thin
/// pass-throughs; the server never inspects the returned JSON.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    async fn recent_episodes(&self, page: u32, kind: u32) -> Result<Value>;

    async fn search(&self, keyword: &str, page: u32) -> Result<Value>;

    async fn anime_info(&self, id: &str) -> Result<Value>;

    async fn episode_sources(
        &self,
        id: &str,
        episode_id: &str,
        server: StreamingServer,
        audio: AudioKind,
    ) -> Result<Value>;

    async fn episode_servers(&self, id: &str, episode_id: &str, audio: AudioKind) -> Result<Value>;

    async fn random_anime(&self) -> Result<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_name_mapping() {
        assert_eq!("vidstream".parse(), Ok(StreamingServer::BuiltIn));
        assert_eq!("streamwish".parse(), Ok(StreamingServer::StreamWish));
        assert_eq!("mp4upload".parse(), Ok(StreamingServer::Mp4Upload));
        assert_eq!("vidhide".parse(), Ok(StreamingServer::VidHide));
    }

    #[test]
    fn test_unknown_server_is_rejected() {
        assert_eq!(
            "doodstream".parse::<StreamingServer>(),
            Err(UnknownServer)
        );
        // No case folding and no default fallthrough.
        assert_eq!("VidStream".parse::<StreamingServer>(), Err(UnknownServer));
        assert_eq!("".parse::<StreamingServer>(), Err(UnknownServer));
    }

    #[test]
    fn test_audio_kind() {
        assert_eq!("sub".parse(), Ok(AudioKind::Sub));
        assert_eq!("dub".parse(), Ok(AudioKind::Dub));
        assert_eq!("raw".parse::<AudioKind>(), Err(InvalidAudioKind));
        assert_eq!(AudioKind::default(), AudioKind::Sub);
    }
}
