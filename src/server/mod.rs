//! HTTP API server and routing

pub mod handlers;

use crate::cache::{Cache, MemoryStore};
#[cfg(feature = "redis-support")]
use crate::cache::RedisStore;
use crate::catalog::{AnixCatalog, CatalogProvider};
use crate::config::settings::AppConfig;
use crate::error::{Error, Result};
use crate::proxy::{endpoint, HttpClient};
use crate::tls::TlsProfiles;
use crate::utils::{json_message, QueryParams};
use crate::{log_debug, log_info};
use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

/// Shared state for every request handler.
pub struct AppState {
    pub config: AppConfig,
    pub http: HttpClient,
    pub tls: TlsProfiles,
    pub cache: Option<Cache>,
    pub provider: Arc<dyn CatalogProvider>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self> {
        let provider: Arc<dyn CatalogProvider> = Arc::new(AnixCatalog::new(&config.provider)?);
        Self::with_provider(config, provider)
    }

    /// Build state around an externally supplied provider.
    pub fn with_provider(config: AppConfig, provider: Arc<dyn CatalogProvider>) -> Result<Self> {
        let cache = build_cache(&config)?;
        Ok(Self {
            http: HttpClient::new(),
            tls: TlsProfiles::new()?,
            cache,
            provider,
            config,
        })
    }

    /// Read-through fetch when the cache is enabled, direct producer call
    /// otherwise.
    pub async fn cached<T, F, Fut>(&self, key: &str, ttl: Duration, producer: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match &self.cache {
            Some(cache) => cache.fetch(key, ttl, producer).await,
            None => producer().await,
        }
    }
}

fn build_cache(config: &AppConfig) -> Result<Option<Cache>> {
    let storage = config.cache.storage.as_str();
    match storage {
        "disabled" => Ok(None),
        "memory" => Ok(Some(Cache::new(
            Box::new(MemoryStore::new()),
            config.cache.prefix.clone(),
        ))),
        "redis" | "auto" => {
            let url = match config.redis.connection_url() {
                Some(url) => url,
                None if storage == "auto" => return Ok(None),
                None => {
                    return Err(Error::Config(
                        "redis cache storage configured but no Redis target set".to_string(),
                    ))
                }
            };

            #[cfg(feature = "redis-support")]
            {
                Ok(Some(Cache::new(
                    Box::new(RedisStore::connect(&url)?),
                    config.cache.prefix.clone(),
                )))
            }
            #[cfg(not(feature = "redis-support"))]
            {
                let _ = url;
                tracing::warn!("Redis target configured but redis-support feature is disabled; running without cache");
                Ok(None)
            }
        }
        other => Err(Error::Config(format!(
            "Invalid cache storage type '{}'. Must be 'auto', 'redis', 'memory' or 'disabled'",
            other
        ))),
    }
}

/// The HTTP API server.
pub struct ApiServer {
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(state: AppState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    /// Start the server; runs until the listener fails.
    pub async fn start(self) -> Result<()> {
        let listen_addr = self.state.config.listen_addr;

        match &self.state.cache {
            Some(cache) => log_info!("Cache enabled ({})", cache.cache_info()),
            None => log_info!("No cache store configured. Cache disabled."),
        }

        let state = Arc::clone(&self.state);
        let make_svc = make_service_fn(move |_conn| {
            let state = Arc::clone(&state);
            async move {
                Ok::<_, Infallible>(service_fn(move |request| {
                    let state = Arc::clone(&state);
                    async move { Ok::<_, Infallible>(route(state, request).await) }
                }))
            }
        });

        log_info!("Server listening on {}", listen_addr);
        Server::bind(&listen_addr).serve(make_svc).await?;

        Ok(())
    }
}

/// Route table. Every response leaves with the permissive CORS header, and
/// any error a catalog handler returns is reported exactly once here as a
/// 500 with the error's message.
pub async fn route(state: Arc<AppState>, request: Request<Body>) -> Response<Body> {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    log_debug!("{} {}", method, path);

    let mut response = if method == Method::OPTIONS {
        // CORS preflight for browser players.
        Response::builder()
            .status(StatusCode::NO_CONTENT)
            .header("access-control-allow-methods", "GET,HEAD,OPTIONS")
            .header("access-control-allow-headers", "*")
            .body(Body::empty())
            .unwrap_or_else(|_| Response::new(Body::empty()))
    } else if method == Method::GET {
        match path.as_str() {
            "/m3u8-proxy" => endpoint::handle(Arc::clone(&state), request).await,
            "/health" => handlers::health(),
            "/recent-episodes" | "/search" | "/info" | "/watch" | "/servers" | "/random-anime" => {
                let query = QueryParams::from_query(request.uri().query());
                let result = match path.as_str() {
                    "/recent-episodes" => handlers::recent_episodes(&state, &query).await,
                    "/search" => handlers::search(&state, &query).await,
                    "/info" => handlers::anime_info(&state, &query).await,
                    "/watch" => handlers::watch(&state, &query).await,
                    "/servers" => handlers::episode_servers(&state, &query).await,
                    _ => handlers::random_anime(&state).await,
                };
                result.unwrap_or_else(|e| {
                    error!("{} failed: {}", path, e);
                    json_message(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
                })
            }
            _ => json_message(StatusCode::NOT_FOUND, "Not found"),
        }
    } else {
        json_message(StatusCode::NOT_FOUND, "Not found")
    };

    response
        .headers_mut()
        .entry(ACCESS_CONTROL_ALLOW_ORIGIN)
        .or_insert(HeaderValue::from_static("*"));
    response
}
