//! LLM client trait and a scripted client for tests

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Result, RoutebookError};
use crate::llm::types::{CompletionRequest, CompletionResponse};

/// Stateless LLM client; each call is independent (fresh context)
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Single completion request (blocking until complete)
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Model identifier used for requests
    fn model(&self) -> &str;
}

/// Client that replays queued responses in order and records every request
#[derive(Debug, Default)]
pub struct MockLlmClient {
    responses: Mutex<VecDeque<Result<CompletionResponse>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a text response
    pub fn with_response(self, content: impl Into<String>) -> Self {
        self.push(Ok(CompletionResponse::text(content)));
        self
    }

    /// Queue an error
    pub fn with_error(self, error: RoutebookError) -> Self {
        self.push(Err(error));
        self
    }

    fn push(&self, response: Result<CompletionResponse>) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(response);
        }
    }

    /// Requests seen so far
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        self.responses
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or_else(|| Err(RoutebookError::Upstream("mock LLM has no scripted response".to_string())))
    }

    fn model(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_replays_in_order() {
        let client = MockLlmClient::new().with_response("first").with_response("second");

        let a = client.complete(CompletionRequest::new("sys")).await.unwrap();
        let b = client.complete(CompletionRequest::new("sys")).await.unwrap();

        assert_eq!(a.content, "first");
        assert_eq!(b.content, "second");
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_exhausted_is_upstream_error() {
        let client = MockLlmClient::new();
        let err = client.complete(CompletionRequest::new("sys")).await.unwrap_err();
        assert_eq!(err.kind(), "Upstream");
    }

    #[tokio::test]
    async fn test_mock_records_requests() {
        let client = MockLlmClient::new().with_error(RoutebookError::UpstreamTimeout("llm".to_string()));

        let result = client
            .complete(CompletionRequest::new("planner").with_user_message("hello"))
            .await;

        assert!(matches!(result, Err(RoutebookError::UpstreamTimeout(_))));
        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].system, "planner");
    }
}
