//! HTTP utility functions

use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use hyper::{Body, Response, StatusCode};
use serde_json::{json, Value};
use std::collections::HashMap;

/// Response headers a caller may not smuggle through the proxy's header
/// bundle; the proxy owns its own CORS policy.
pub const CORS_CONTROL_HEADERS: [&str; 3] = [
    "access-control-allow-origin",
    "access-control-allow-methods",
    "access-control-allow-headers",
];

/// Check if a header is a hop-by-hop header
pub fn is_hop_by_hop_header(name: &str) -> bool {
    let hop_by_hop_headers = [
        "connection",
        "keep-alive",
        "proxy-authenticate",
        "proxy-authorization",
        "te",
        "trailers",
        "transfer-encoding",
        "upgrade",
    ];

    hop_by_hop_headers.contains(&name.to_lowercase().as_str())
}

/// Check if a header is one of the CORS-control headers stripped from the
/// caller-supplied bundle.
pub fn is_cors_control_header(name: &str) -> bool {
    CORS_CONTROL_HEADERS.contains(&name.to_lowercase().as_str())
}

/// Merge the caller's header bundle over the proxy defaults. CORS-control
/// keys are dropped; a caller-supplied User-Agent replaces the default one.
pub fn merge_upstream_headers(extra: &HashMap<String, String>, user_agent: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if let Ok(value) = HeaderValue::from_str(user_agent) {
        headers.insert(USER_AGENT, value);
    }

    for (name, value) in extra {
        if is_cors_control_header(name) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (name.parse::<HeaderName>(), HeaderValue::from_str(value)) {
            headers.insert(name, value);
        }
    }

    headers
}

/// Decoded query parameters; the last value wins for repeated keys.
#[derive(Debug, Default)]
pub struct QueryParams(HashMap<String, String>);

impl QueryParams {
    pub fn from_query(query: Option<&str>) -> Self {
        let mut params = HashMap::new();
        if let Some(query) = query {
            for (name, value) in form_urlencoded::parse(query.as_bytes()) {
                params.insert(name.into_owned(), value.into_owned());
            }
        }
        Self(params)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Value of a parameter, treating empty strings as absent.
    pub fn get_non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|value| !value.is_empty())
    }
}

/// Build a `{"message": ...}` JSON response
pub fn json_message(status: StatusCode, message: &str) -> Response<Body> {
    json_response(status, &json!({ "message": message }))
}

/// Build a JSON response from a serializable value
pub fn json_response(status: StatusCode, value: &Value) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(value.to_string()))
        .unwrap_or_else(|_| {
            let mut response = Response::new(Body::from(value.to_string()));
            *response.status_mut() = status;
            response
        })
}
