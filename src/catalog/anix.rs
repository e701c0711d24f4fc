//! Reqwest-backed catalog client

use super::{AudioKind, CatalogProvider, StreamingServer};
use crate::config::settings::ProviderConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Thin JSON client for the remote catalog service.
pub struct AnixCatalog {
    client: reqwest::Client,
    base_url: String,
}

impl AnixCatalog {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(format!("anix-api/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Provider(format!("Failed to create catalog client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!("catalog request: {} {:?}", url, query);

        let response = self.client.get(&url).query(query).send().await?;
        let response = response.error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl CatalogProvider for AnixCatalog {
    async fn recent_episodes(&self, page: u32, kind: u32) -> Result<Value> {
        self.get_json(
            "/recent-episodes",
            &[("page", page.to_string()), ("type", kind.to_string())],
        )
        .await
    }

    async fn search(&self, keyword: &str, page: u32) -> Result<Value> {
        self.get_json(
            "/search",
            &[("keyword", keyword.to_string()), ("page", page.to_string())],
        )
        .await
    }

    async fn anime_info(&self, id: &str) -> Result<Value> {
        self.get_json("/info", &[("id", id.to_string())]).await
    }

    async fn episode_sources(
        &self,
        id: &str,
        episode_id: &str,
        server: StreamingServer,
        audio: AudioKind,
    ) -> Result<Value> {
        self.get_json(
            "/watch",
            &[
                ("id", id.to_string()),
                ("epId", episode_id.to_string()),
                ("server", server.as_str().to_string()),
                ("type", audio.as_str().to_string()),
            ],
        )
        .await
    }

    async fn episode_servers(&self, id: &str, episode_id: &str, audio: AudioKind) -> Result<Value> {
        self.get_json(
            "/servers",
            &[
                ("id", id.to_string()),
                ("epId", episode_id.to_string()),
                ("type", audio.as_str().to_string()),
            ],
        )
        .await
    }

    async fn random_anime(&self) -> Result<Value> {
        self.get_json("/random-anime", &[]).await
    }
}
