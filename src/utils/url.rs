//! URL utility functions

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

/// Characters left verbatim by JavaScript's `encodeURIComponent`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Parse URL and extract components
pub fn parse_url(url_str: &str) -> Result<Url, url::ParseError> {
    Url::parse(url_str)
}

/// Whether the raw, unparsed URL string selects TLS. The raw string is the
/// authoritative transport signal for segment streaming, not the parsed URL.
pub fn is_https_url(raw: &str) -> bool {
    raw.starts_with("https://")
}

/// Percent-encode a string as a single opaque query component.
pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}

/// Origin plus directory path of a manifest URL: the path with a trailing
/// `<name>.m3u8` segment removed. Non-manifest paths come back unchanged.
pub fn manifest_base(url: &Url) -> String {
    let path = url.path();
    let dir = match path.rfind('/') {
        Some(idx) => {
            let tail = &path[idx + 1..];
            if tail.ends_with(".m3u8") && tail != ".m3u8" {
                &path[..=idx]
            } else {
                path
            }
        }
        None => path,
    };
    format!("{}{}", url.origin().ascii_serialization(), dir)
        .trim()
        .to_string()
}

/// Path and query in HTTP/1.1 origin form.
pub fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

/// Host header value: host, plus the port when it is not the scheme default.
pub fn host_header_value(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    match url.port() {
        Some(port) => Some(format!("{}:{}", host, port)),
        None => Some(host.to_string()),
    }
}
