//! Raw upstream streaming for binary media segments

use crate::error::{Error, Result};
use crate::proxy::classify::Container;
use crate::tls::TlsProfiles;
use crate::utils::{host_header_value, is_hop_by_hop_header, is_https_url, path_and_query};
use hyper::header::{
    HeaderMap, HeaderValue, ACCEPT_RANGES, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_DISPOSITION,
    CONTENT_TYPE, HOST,
};
use hyper::{Body, Request, Response};
use rustls::ServerName;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;
use url::Url;

/// Everything the streamer needs besides the inbound request itself.
pub struct SegmentTarget<'a> {
    pub url: &'a Url,
    /// The unparsed `url` query value; its scheme prefix is the authoritative
    /// TLS-selection signal.
    pub raw_url: &'a str,
    pub container: Container,
    /// Client-supplied download name for the `Content-Disposition` header.
    pub filename: Option<&'a str>,
}

/// Open a raw upstream connection and pipe the response through to the
/// client.
///
/// The connection is exclusive to this request and torn down when the
/// response body finishes, the client goes away, or an error fires; nothing
/// is pooled. Both bodies stream chunk by chunk; neither side is buffered in
/// full. The timeout covers the connection attempt and response-header
/// receipt and surfaces as `Error::Timeout`.
pub async fn stream_segment(
    tls: &TlsProfiles,
    timeout: Duration,
    target: SegmentTarget<'_>,
    upstream_headers: HeaderMap,
    inbound: Request<Body>,
) -> Result<Response<Body>> {
    let use_tls = is_https_url(target.raw_url);
    let host = target
        .url
        .host_str()
        .ok_or_else(|| Error::UpstreamConnection("target URL has no host".to_string()))?
        .to_string();
    let port = target
        .url
        .port_or_known_default()
        .unwrap_or(if use_tls { 443 } else { 80 });

    // Forward the original method and stream the inbound body upstream.
    let method = inbound.method().clone();
    let mut upstream_request = Request::builder()
        .method(method)
        .uri(path_and_query(target.url))
        .body(inbound.into_body())?;
    *upstream_request.headers_mut() = upstream_headers;
    if let Some(host_value) = host_header_value(target.url) {
        if let Ok(value) = HeaderValue::from_str(&host_value) {
            upstream_request.headers_mut().insert(HOST, value);
        }
    }

    let connect = async {
        let stream = TcpStream::connect((host.as_str(), port)).await?;
        stream.set_nodelay(true)?;

        if use_tls {
            let config = tls.client_config(target.container.skip_cert_verify());
            let server_name = ServerName::try_from(host.as_str()).map_err(|e| {
                Error::UpstreamConnection(format!("invalid server name {}: {}", host, e))
            })?;
            let tls_stream = TlsConnector::from(config)
                .connect(server_name, stream)
                .await?;

            let (sender, connection) = hyper::client::conn::Builder::new()
                .handshake::<_, Body>(tls_stream)
                .await?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    debug!("upstream connection ended: {}", e);
                }
            });
            Ok::<_, Error>(sender)
        } else {
            let (sender, connection) = hyper::client::conn::Builder::new()
                .handshake::<_, Body>(stream)
                .await?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    debug!("upstream connection ended: {}", e);
                }
            });
            Ok(sender)
        }
    };

    let mut sender = tokio::time::timeout(timeout, connect).await??;
    let upstream_response =
        tokio::time::timeout(timeout, sender.send_request(upstream_request)).await??;

    Ok(client_response(
        upstream_response,
        target.container,
        target.filename,
    ))
}

/// Forward the upstream status and headers, overriding the media headers and
/// handing the body through without buffering.
fn client_response(
    upstream: Response<Body>,
    container: Container,
    filename: Option<&str>,
) -> Response<Body> {
    let (parts, body) = upstream.into_parts();

    let mut response = Response::new(body);
    *response.status_mut() = parts.status;
    for (name, value) in &parts.headers {
        if !is_hop_by_hop_header(name.as_str()) {
            response.headers_mut().insert(name.clone(), value.clone());
        }
    }

    let headers = response.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(container.content_type()),
    );
    if container == Container::Mp4 {
        headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        if let Some(name) = filename {
            if let Ok(value) =
                HeaderValue::from_str(&format!("attachment; filename=\"{}.mp4\"", name))
            {
                headers.insert(CONTENT_DISPOSITION, value);
            }
        }
    }
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::Method;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn inbound() -> Request<Body> {
        Request::builder()
            .method(Method::GET)
            .uri("/m3u8-proxy")
            .body(Body::empty())
            .unwrap()
    }

    fn segment_target<'a>(url: &'a Url, raw: &'a str, container: Container) -> SegmentTarget<'a> {
        SegmentTarget {
            url,
            raw_url: raw,
            container,
            filename: None,
        }
    }

    /// Serve one canned HTTP/1.1 response on a loopback listener.
    async fn one_shot_upstream(response: &'static str) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn test_ts_segment_headers_are_forced() {
        let addr = one_shot_upstream(
            "HTTP/1.1 200 OK\r\ncontent-type: application/octet-stream\r\ncontent-length: 4\r\n\r\nDATA",
        )
        .await;

        let raw = format!("http://{}/live/seg0.ts", addr);
        let url = Url::parse(&raw).unwrap();
        let tls = TlsProfiles::new().unwrap();

        let response = stream_segment(
            &tls,
            Duration::from_secs(5),
            segment_target(&url, &raw, Container::Ts),
            HeaderMap::new(),
            inbound(),
        )
        .await
        .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.headers()[CONTENT_TYPE], "video/mp2t");
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        assert_eq!(&body[..], b"DATA");
    }

    #[tokio::test]
    async fn test_mp4_segment_gets_disposition_and_ranges() {
        let addr =
            one_shot_upstream("HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nOK").await;

        let raw = format!("http://{}/movie.mp4", addr);
        let url = Url::parse(&raw).unwrap();
        let tls = TlsProfiles::new().unwrap();

        let response = stream_segment(
            &tls,
            Duration::from_secs(5),
            SegmentTarget {
                url: &url,
                raw_url: &raw,
                container: Container::Mp4,
                filename: Some("movie"),
            },
            HeaderMap::new(),
            inbound(),
        )
        .await
        .unwrap();

        assert_eq!(response.headers()[CONTENT_TYPE], "video/mp4");
        assert_eq!(response.headers()[ACCEPT_RANGES], "bytes");
        assert_eq!(
            response.headers()[CONTENT_DISPOSITION],
            "attachment; filename=\"movie.mp4\""
        );
    }

    #[tokio::test]
    async fn test_upstream_status_is_forwarded() {
        let addr = one_shot_upstream("HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\n\r\n").await;

        let raw = format!("http://{}/gone.ts", addr);
        let url = Url::parse(&raw).unwrap();
        let tls = TlsProfiles::new().unwrap();

        let response = stream_segment(
            &tls,
            Duration::from_secs(5),
            segment_target(&url, &raw, Container::Ts),
            HeaderMap::new(),
            inbound(),
        )
        .await
        .unwrap();

        assert_eq!(response.status(), 404);
        assert_eq!(response.headers()[CONTENT_TYPE], "video/mp2t");
    }

    #[tokio::test]
    async fn test_silent_upstream_times_out() {
        // Accept the connection and never answer.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let raw = format!("http://{}/slow.ts", addr);
        let url = Url::parse(&raw).unwrap();
        let tls = TlsProfiles::new().unwrap();

        let result = stream_segment(
            &tls,
            Duration::from_millis(200),
            segment_target(&url, &raw, Container::Ts),
            HeaderMap::new(),
            inbound(),
        )
        .await;

        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn test_connection_refused_is_an_upstream_error() {
        // Grab a port and release it so the connect is refused.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let raw = format!("http://{}/seg.ts", addr);
        let url = Url::parse(&raw).unwrap();
        let tls = TlsProfiles::new().unwrap();

        let result = stream_segment(
            &tls,
            Duration::from_secs(2),
            segment_target(&url, &raw, Container::Ts),
            HeaderMap::new(),
            inbound(),
        )
        .await;

        assert!(matches!(result, Err(Error::Io(_))));
    }
}
