//! Pooled HTTP client for manifest and passthrough fetches
//!
//! Segment streaming bypasses this client on purpose: those requests own a
//! raw per-request connection (see `segment`), while manifest and opaque
//! fetches reuse pooled connections like any ordinary client.

use hyper::{Body, Client, Request, Response};
use hyper_rustls::HttpsConnectorBuilder;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct HttpClient {
    client: Arc<Client<hyper_rustls::HttpsConnector<hyper::client::HttpConnector>, Body>>,
}

impl HttpClient {
    pub fn new() -> Self {
        let https_connector = HttpsConnectorBuilder::new()
            .with_native_roots()
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build(https_connector);

        Self {
            client: Arc::new(client),
        }
    }

    pub async fn request(&self, request: Request<Body>) -> hyper::Result<Response<Body>> {
        debug!("fetch {} {}", request.method(), request.uri());
        self.client.request(request).await
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}
