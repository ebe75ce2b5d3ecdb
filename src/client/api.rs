//! Remote API seam
//!
//! The engine only ever talks to the service through [`CloudApi`]. The
//! production binding is [`HttpCloudApi`](super::http::HttpCloudApi); tests
//! substitute in-memory or mock-server implementations.

use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

/// One outbound mutating call
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn post(path: impl Into<String>, body: impl Serialize) -> Result<Self> {
        Ok(Self {
            method: Method::POST,
            path: path.into(),
            body: Some(serde_json::to_value(body)?),
        })
    }

    pub fn put(path: impl Into<String>, body: impl Serialize) -> Result<Self> {
        Ok(Self {
            method: Method::PUT,
            path: path.into(),
            body: Some(serde_json::to_value(body)?),
        })
    }

    /// POST without a body, used for action endpoints like pause/resume
    pub fn action(path: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: None,
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::DELETE,
            path: path.into(),
            body: None,
        }
    }
}

#[async_trait]
pub trait CloudApi: Send + Sync {
    /// Issue a mutating call. Returns the unwrapped `data` payload of the
    /// accepted response (`Value::Null` for empty bodies).
    async fn submit(&self, request: ApiRequest) -> Result<Value>;

    /// Read a resource or listing. A missing resource surfaces as an error
    /// whose kind is [`ErrorKind::NotFound`](crate::error::ErrorKind::NotFound).
    async fn fetch(&self, path: &str) -> Result<Value>;
}
