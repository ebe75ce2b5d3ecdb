//! `reqwest` binding of [`CloudApi`]

use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use serde_json::Value;
use tracing::{debug, instrument};

use super::api::{ApiRequest, CloudApi};
use super::classifier::ErrorClassifier;
use crate::config::EngineConfig;
use crate::error::{Error, ErrorKind, Result};

const USER_AGENT: &str = concat!("dbplane/", env!("CARGO_PKG_VERSION"));

/// HTTP client for the control-plane API.
///
/// Every reply is JSON wrapped in a `{"data": ...}` envelope; the envelope is
/// stripped before the payload is handed back.
#[derive(Clone)]
pub struct HttpCloudApi {
    client: Client,
    base_url: String,
    api_key: String,
    classifier: ErrorClassifier,
}

impl HttpCloudApi {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.api.request_timeout())
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::TransportError {
                kind: ErrorKind::Fatal,
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: config.api.base_url.trim_end_matches('/').to_string(),
            api_key: config.api.api_key.clone(),
            classifier: ErrorClassifier::new(&config.errors),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let mut request = self
            .client
            .request(method, self.url(path))
            .bearer_auth(&self.api_key);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.classifier.transport_error(&e))?;

        self.unwrap_response(response).await
    }

    async fn unwrap_response(&self, response: Response) -> Result<Value> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.classifier.transport_error(&e))?;

        if !status.is_success() {
            return Err(self.classifier.api_error(status.as_u16(), &body));
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        let mut json: Value = serde_json::from_str(&body)?;
        Ok(match json.get_mut("data") {
            Some(data) => data.take(),
            None => json,
        })
    }
}

#[async_trait]
impl CloudApi for HttpCloudApi {
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    async fn submit(&self, request: ApiRequest) -> Result<Value> {
        debug!("Submitting request");
        self.send(request.method, &request.path, request.body.as_ref())
            .await
    }

    #[instrument(skip(self))]
    async fn fetch(&self, path: &str) -> Result<Value> {
        debug!("Fetching");
        self.send(Method::GET, path, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api_for(server: &MockServer) -> HttpCloudApi {
        let mut config = EngineConfig::default();
        config.api.base_url = server.uri();
        config.api.api_key = "secret-key".to_string();
        config.api.request_timeout_secs = 1;
        HttpCloudApi::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_unwraps_data_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/public/v1/accounts/a/projects/p/clusters/c1"))
            .and(header("authorization", "Bearer secret-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"info": {"id": "c1"}}
            })))
            .mount(&server)
            .await;

        let value = api_for(&server)
            .fetch("/api/public/v1/accounts/a/projects/p/clusters/c1")
            .await
            .unwrap();
        assert_eq!(value, json!({"info": {"id": "c1"}}));
    }

    #[tokio::test]
    async fn test_submit_sends_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/things"))
            .and(body_json(json!({"name": "x"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"id": "t1"}})))
            .expect(1)
            .mount(&server)
            .await;

        let value = api_for(&server)
            .submit(ApiRequest::post("/things", json!({"name": "x"})).unwrap())
            .await
            .unwrap();
        assert_eq!(value, json!({"id": "t1"}));
    }

    #[tokio::test]
    async fn test_empty_body_is_null() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/things/t1"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let value = api_for(&server)
            .submit(ApiRequest::delete("/things/t1"))
            .await
            .unwrap();
        assert_eq!(value, Value::Null);
    }

    #[tokio::test]
    async fn test_not_found_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/things/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"status": 404, "detail": "Thing not found"}
            })))
            .mount(&server)
            .await;

        let err = api_for(&server).fetch("/things/missing").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("Thing not found"));
    }

    #[tokio::test]
    async fn test_server_error_is_retryable_and_conflict_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/conflict"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "error": {"detail": "name already taken"}
            })))
            .mount(&server)
            .await;

        let api = api_for(&server);
        let err = api.fetch("/flaky").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Retryable);

        let err = api.submit(ApiRequest::action("/conflict")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert!(err.to_string().contains("name already taken"));
    }

    #[tokio::test]
    async fn test_html_gateway_page_is_truncated() {
        let server = MockServer::start().await;
        let page = format!("<html><body>{}</body></html>", "z".repeat(25_000));
        Mock::given(method("GET"))
            .and(path("/gateway"))
            .respond_with(ResponseTemplate::new(401).set_body_string(page))
            .mount(&server)
            .await;

        let err = api_for(&server).fetch("/gateway").await.unwrap_err();
        let message = err.to_string();
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert!(message.contains("[truncated"));
        assert!(message.len() < 10_500);
    }

    #[tokio::test]
    async fn test_request_timeout_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let err = api_for(&server).fetch("/slow").await.unwrap_err();
        assert!(matches!(err, Error::TransportError { .. }));
        assert!(err.is_retryable());
    }
}
