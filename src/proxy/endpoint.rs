//! `/m3u8-proxy` request orchestration
//!
//! Per-request flow: validate the target URL (400 before any upstream I/O),
//! decode the optional header bundle (malformed input is an unrecovered
//! error, reported as 500 by the outer boundary), classify once, then
//! dispatch to manifest rewriting, raw segment streaming or opaque
//! passthrough. Each path is a single future resolving to exactly one
//! terminal response, so a late timeout can never race a late error into a
//! second write.

use crate::error::{Error, Result};
use crate::proxy::classify::{classify, ResourceKind};
use crate::proxy::manifest::{rewrite_manifest, MANIFEST_CONTENT_TYPE};
use crate::proxy::segment::{stream_segment, SegmentTarget};
use crate::server::AppState;
use crate::utils::{json_message, json_response, merge_upstream_headers, QueryParams};
use hyper::header::{HeaderMap, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{Body, Method, Request, Response, StatusCode};
use percent_encoding::percent_decode_str;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;
use url::Url;

/// Decoded form of the `/m3u8-proxy` query parameters.
pub struct ProxyRequest {
    /// Parsed absolute target.
    pub target: Url,
    /// The unparsed `url` value, kept for TLS selection.
    pub raw_url: String,
    /// Percent-decoded header bundle, kept verbatim for manifest rewriting.
    pub headers_param: Option<String>,
    /// Parsed header bundle, CORS-control keys not yet stripped.
    pub extra_headers: HashMap<String, String>,
    /// Download name for MP4 targets.
    pub filename: Option<String>,
}

impl ProxyRequest {
    /// Decode the remaining query parameters for an already validated target.
    /// A header bundle that does not decode or parse is an error, not a
    /// validation failure.
    fn decode(query: &QueryParams, raw_url: String, target: Url) -> Result<Self> {
        let headers_param = match query.get_non_empty("headers") {
            Some(raw) => Some(
                percent_decode_str(raw)
                    .decode_utf8()
                    .map_err(|e| {
                        Error::RequestProcessing(format!("invalid headers parameter: {}", e))
                    })?
                    .into_owned(),
            ),
            None => None,
        };

        let extra_headers = match &headers_param {
            Some(raw) => serde_json::from_str(raw)?,
            None => HashMap::new(),
        };

        Ok(Self {
            target,
            raw_url,
            headers_param,
            extra_headers,
            filename: query.get_non_empty("filename").map(str::to_string),
        })
    }

    fn upstream_headers(&self, user_agent: &str) -> HeaderMap {
        merge_upstream_headers(&self.extra_headers, user_agent)
    }
}

/// Entry point for `/m3u8-proxy`.
pub async fn handle(state: Arc<AppState>, request: Request<Body>) -> Response<Body> {
    let query = QueryParams::from_query(request.uri().query());

    // The target must parse as an absolute URL before any upstream I/O.
    let raw_url = match query.get_non_empty("url") {
        Some(raw) => raw.to_string(),
        None => return json_message(StatusCode::BAD_REQUEST, "Invalid URL"),
    };
    let target = match Url::parse(&raw_url) {
        Ok(url) => url,
        Err(_) => return json_message(StatusCode::BAD_REQUEST, "Invalid URL"),
    };

    match dispatch(state, request, &query, raw_url, target).await {
        Ok(response) => response,
        Err(e) => {
            error!("proxy request failed: {}", e);
            json_message(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

async fn dispatch(
    state: Arc<AppState>,
    request: Request<Body>,
    query: &QueryParams,
    raw_url: String,
    target: Url,
) -> Result<Response<Body>> {
    let proxy_request = ProxyRequest::decode(query, raw_url, target)?;
    let upstream_headers = proxy_request.upstream_headers(&state.config.proxy.user_agent);

    match classify(&proxy_request.target) {
        ResourceKind::Manifest => {
            proxy_manifest(&state, &proxy_request, upstream_headers).await
        }
        ResourceKind::Segment(container) => {
            let target = SegmentTarget {
                url: &proxy_request.target,
                raw_url: &proxy_request.raw_url,
                container,
                filename: proxy_request.filename.as_deref(),
            };
            match stream_segment(
                &state.tls,
                state.config.proxy.timeout(),
                target,
                upstream_headers,
                request,
            )
            .await
            {
                Ok(response) => Ok(response),
                Err(Error::Timeout(_)) => {
                    Ok(json_message(StatusCode::GATEWAY_TIMEOUT, "Request timed out."))
                }
                Err(e) => {
                    error!("proxy request error: {}", e);
                    Ok(json_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        &json!({ "message": "Proxy failed.", "error": e.to_string() }),
                    ))
                }
            }
        }
        ResourceKind::Opaque => passthrough(&state, &proxy_request, upstream_headers).await,
    }
}

/// Fetch a playlist and rewrite its references through the proxy.
async fn proxy_manifest(
    state: &AppState,
    proxy_request: &ProxyRequest,
    upstream_headers: HeaderMap,
) -> Result<Response<Body>> {
    let mut request = Request::builder()
        .method(Method::GET)
        .uri(proxy_request.target.as_str())
        .body(Body::empty())?;
    *request.headers_mut() = upstream_headers;

    let upstream = state.http.request(request).await?;
    // The upstream's declared content type wins over the playlist default.
    let content_type = upstream
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or(MANIFEST_CONTENT_TYPE)
        .to_string();

    let raw = hyper::body::to_bytes(upstream.into_body()).await?;
    let body = String::from_utf8_lossy(&raw);
    let rewritten = rewrite_manifest(
        &body,
        &proxy_request.target,
        proxy_request.headers_param.as_deref(),
    );

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type)
        .header(ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .body(Body::from(rewritten))?)
}

/// Fetch and forward a resource that needs no special handling.
async fn passthrough(
    state: &AppState,
    proxy_request: &ProxyRequest,
    upstream_headers: HeaderMap,
) -> Result<Response<Body>> {
    let mut request = Request::builder()
        .method(Method::GET)
        .uri(proxy_request.target.as_str())
        .body(Body::empty())?;
    *request.headers_mut() = upstream_headers;

    let upstream = state.http.request(request).await?;
    let content_type = upstream.headers().get(CONTENT_TYPE).cloned();

    let raw = hyper::body::to_bytes(upstream.into_body()).await?;

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_LENGTH, raw.len())
        .header(ACCESS_CONTROL_ALLOW_ORIGIN, "*");
    if let Some(content_type) = content_type {
        builder = builder.header(CONTENT_TYPE, content_type);
    }

    Ok(builder.body(Body::from(raw))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::AppConfig;
    use crate::server::tests::test_state;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn proxy_get(path_and_query: &str) -> Request<Body> {
        Request::builder()
            .method(Method::GET)
            .uri(path_and_query)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_string(response: Response<Body>) -> String {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_unparseable_url_is_rejected_without_upstream_io() {
        let state = test_state(AppConfig::default());
        let response = handle(state, proxy_get("/m3u8-proxy?url=not-a-url")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_string(response).await, r#"{"message":"Invalid URL"}"#);
    }

    #[tokio::test]
    async fn test_missing_url_is_rejected() {
        let state = test_state(AppConfig::default());
        let response = handle(state, proxy_get("/m3u8-proxy")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_header_bundle_is_a_server_error() {
        let state = test_state(AppConfig::default());
        // The bundle is decoded before any upstream I/O, so the unroutable
        // target is never contacted.
        let response = handle(
            state,
            proxy_get("/m3u8-proxy?url=http%3A%2F%2F127.0.0.1%3A9%2Fx&headers=%7Bnot-json"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    /// Serve one canned manifest over a loopback socket.
    async fn manifest_upstream(manifest: &'static str) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/vnd.apple.mpegurl\r\ncontent-length: {}\r\n\r\n{}",
                manifest.len(),
                manifest
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn test_manifest_is_rewritten_end_to_end() {
        let manifest = "#EXTM3U\n#EXT-X-VERSION:3\nseg0.ts\n";
        let addr = manifest_upstream(manifest).await;
        let state = test_state(AppConfig::default());

        let target = format!("http://{}/path/index.m3u8", addr);
        let request = proxy_get(&format!(
            "/m3u8-proxy?url={}",
            crate::utils::encode_component(&target)
        ));

        let response = handle(state, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "application/vnd.apple.mpegurl"
        );

        let body = body_string(response).await;
        let lines: Vec<&str> = body.split('\n').collect();
        assert_eq!(lines[0], "#EXTM3U");
        assert_eq!(lines[1], "#EXT-X-VERSION:3");
        let expected_base = crate::utils::encode_component(&format!("http://{}/path/", addr));
        assert_eq!(
            lines[2],
            format!("/m3u8-proxy?url={}seg0.ts", expected_base)
        );
    }

    #[tokio::test]
    async fn test_opaque_passthrough_forwards_content_type() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: text/vtt\r\ncontent-length: 6\r\n\r\nWEBVTT",
                )
                .await
                .unwrap();
        });

        let state = test_state(AppConfig::default());
        let target = format!("http://{}/subs.vtt", addr);
        let request = proxy_get(&format!(
            "/m3u8-proxy?url={}",
            crate::utils::encode_component(&target)
        ));

        let response = handle(state, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/vtt");
        assert_eq!(response.headers()[CONTENT_LENGTH], "6");
        assert_eq!(body_string(response).await, "WEBVTT");
    }

    #[tokio::test]
    async fn test_segment_timeout_yields_504_exactly_once() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let mut config = AppConfig::default();
        config.proxy.timeout_secs = 1;
        let state = test_state(config);

        let target = format!("http://{}/slow.ts", addr);
        let request = proxy_get(&format!(
            "/m3u8-proxy?url={}",
            crate::utils::encode_component(&target)
        ));

        let response = handle(state, request).await;
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            body_string(response).await,
            r#"{"message":"Request timed out."}"#
        );
    }

    #[tokio::test]
    async fn test_segment_connection_error_yields_500() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let state = test_state(AppConfig::default());
        let target = format!("http://{}/seg.ts", addr);
        let request = proxy_get(&format!(
            "/m3u8-proxy?url={}",
            crate::utils::encode_component(&target)
        ));

        let response = handle(state, request).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_string(response).await;
        assert!(body.contains("Proxy failed."), "unexpected body: {}", body);
    }
}
