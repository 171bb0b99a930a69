//! Mock backend for testing
//!
//! Records every prompt it is given and answers with a canned reply or a
//! canned failure, so tests can assert on the exact request an agent built.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::Completer;

/// Mock LLM backend for testing
#[derive(Clone)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
    reply: String,
    failure: Option<String>,
    model: String,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub const DEFAULT_REPLY: &'static str = "Mock advice: track your coffee spending.";

    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self {
            healthy: true,
            reply: Self::DEFAULT_REPLY.to_string(),
            failure: None,
            model: "mock".to_string(),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Answer every prompt with `reply`
    pub fn with_reply(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            ..Self::new()
        }
    }

    /// Fail every call as an unavailable collaborator would
    pub fn failing(reason: &str) -> Self {
        Self {
            healthy: false,
            failure: Some(reason.to_string()),
            ..Self::new()
        }
    }

    /// Create an unhealthy mock backend
    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            ..Self::new()
        }
    }

    /// Create a new instance with a different model (shares the prompt log)
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..self.clone()
        }
    }

    /// Every prompt received so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Number of completion calls made
    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or_default()
    }
}

#[async_trait]
impl Completer for MockBackend {
    async fn complete(&self, prompt: &str) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        match &self.failure {
            Some(reason) => Err(Error::Unavailable {
                service: "mock llm".to_string(),
                reason: reason.clone(),
            }),
            None => Ok(self.reply.clone()),
        }
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_prompts() {
        let mock = MockBackend::with_reply("ok");
        let handle = mock.clone();

        assert_eq!(mock.complete("first").await.unwrap(), "ok");
        assert_eq!(mock.complete("second").await.unwrap(), "ok");
        assert_eq!(handle.prompts(), vec!["first", "second"]);
        assert_eq!(handle.call_count(), 2);
    }

    #[tokio::test]
    async fn test_failing_backend() {
        let mock = MockBackend::failing("quota exceeded");
        let err = mock.complete("anything").await.unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
        assert!(!mock.health_check().await);
        assert_eq!(mock.call_count(), 1);
    }
}
