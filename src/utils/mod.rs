//! Utility functions for the API server

pub mod http;
pub mod url;

pub use http::*;
pub use url::*;
