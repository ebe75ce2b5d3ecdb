//! Scripted in-memory [`CloudApi`] for unit tests

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

use super::api::{ApiRequest, CloudApi};
use super::classifier::ErrorClassifier;
use crate::error::{Error, ErrorKind, Result};

#[derive(Clone, Debug)]
pub enum Reply {
    Json(Value),
    Status(u16, String),
    Transport,
}

impl Reply {
    fn into_result(self) -> Result<Value> {
        match self {
            Reply::Json(v) => Ok(v),
            Reply::Status(status, body) => Err(ErrorClassifier::default().api_error(status, &body)),
            Reply::Transport => Err(Error::TransportError {
                kind: ErrorKind::Retryable,
                message: "connection reset".to_string(),
            }),
        }
    }
}

/// Replies are consumed in order; the last one repeats forever
#[derive(Default)]
pub struct FakeCloud {
    fetches: Mutex<HashMap<String, VecDeque<Reply>>>,
    submits: Mutex<HashMap<(Method, String), VecDeque<Reply>>>,
    submitted: Mutex<Vec<ApiRequest>>,
    fetched: Mutex<Vec<String>>,
}

fn next(queue: &mut VecDeque<Reply>) -> Option<Reply> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_fetch(&self, path: impl Into<String>, replies: Vec<Reply>) -> &Self {
        self.fetches
            .lock()
            .unwrap()
            .insert(path.into(), replies.into());
        self
    }

    pub fn on_submit(&self, method: Method, path: impl Into<String>, replies: Vec<Reply>) -> &Self {
        self.submits
            .lock()
            .unwrap()
            .insert((method, path.into()), replies.into());
        self
    }

    pub fn submitted(&self) -> Vec<ApiRequest> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn fetch_count(&self, path: &str) -> usize {
        self.fetched
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.as_str() == path)
            .count()
    }
}

#[async_trait]
impl CloudApi for FakeCloud {
    async fn submit(&self, request: ApiRequest) -> Result<Value> {
        let key = (request.method.clone(), request.path.clone());
        self.submitted.lock().unwrap().push(request);
        let reply = self
            .submits
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(next)
            .unwrap_or(Reply::Json(Value::Null));
        reply.into_result()
    }

    async fn fetch(&self, path: &str) -> Result<Value> {
        self.fetched.lock().unwrap().push(path.to_string());
        let reply = self
            .fetches
            .lock()
            .unwrap()
            .get_mut(path)
            .and_then(next)
            .unwrap_or_else(|| Reply::Status(404, format!("{path} not scripted")));
        reply.into_result()
    }
}
