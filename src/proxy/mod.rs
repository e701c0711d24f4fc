//! Streaming media proxy

pub mod classify;
pub mod endpoint;
pub mod http_client;
pub mod manifest;
pub mod segment;

pub use classify::{classify, Container, ResourceKind};
pub use endpoint::ProxyRequest;
pub use http_client::HttpClient;
