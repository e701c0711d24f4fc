//! Anix API - anime catalog API with a streaming media-manifest proxy
//!
//! This library provides the catalog endpoints, a generic read-through cache
//! over a TTL key-value store, and the `/m3u8-proxy` endpoint that rewrites
//! playlists and streams media segments through raw per-request upstream
//! connections.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod logging;
pub mod proxy;
pub mod server;
pub mod tls;
pub mod utils;

// Re-export commonly used items
pub use config::settings::AppConfig;
pub use error::{Error, Result};
pub use logging::{
    init_logger, init_logger_with_level, log_debug, log_error, log_info, log_trace, log_warning,
};
pub use server::{ApiServer, AppState};
