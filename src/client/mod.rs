//! Control-plane API client: transport, paths, wire payloads and error classification

pub mod api;
pub mod classifier;
pub mod http;
pub mod paths;
pub mod payload;

#[cfg(test)]
pub(crate) mod fake;

pub use api::{ApiRequest, CloudApi};
pub use classifier::{Classification, ErrorClassifier, MAX_ERROR_BODY_CHARS};
pub use http::HttpCloudApi;
pub use paths::ApiPaths;
