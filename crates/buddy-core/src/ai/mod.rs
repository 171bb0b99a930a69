//! Pluggable LLM backend abstraction
//!
//! The advisory agents need exactly one thing from a language model: turn a
//! rendered prompt into text. Everything provider-specific lives behind that.
//!
//! # Architecture
//!
//! - `Completer` trait: the single completion call plus health/model/host
//! - `LlmClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `GeminiBackend`, `OpenAICompatibleBackend`,
//!   `OllamaBackend`, `MockBackend`
//!
//! # Configuration
//!
//! Environment variables:
//! - `LLM_BACKEND`: Backend to use (gemini, openai_compatible, ollama, mock). Default: gemini
//! - `GEMINI_API_KEY` (or legacy `GEMINI_API`): Google AI Studio key
//! - `GEMINI_MODEL`: Model name (default: gemini-2.0-flash)
//! - `GEMINI_HOST`: API base URL (default: https://generativelanguage.googleapis.com)
//! - `OPENAI_COMPATIBLE_HOST`, `OPENAI_COMPATIBLE_MODEL`, `OPENAI_COMPATIBLE_API_KEY`
//! - `OLLAMA_HOST`, `OLLAMA_MODEL`

mod gemini;
mod mock;
mod ollama;
mod openai_compatible;

pub use gemini::GeminiBackend;
pub use mock::MockBackend;
pub use ollama::OllamaBackend;
pub use openai_compatible::OpenAICompatibleBackend;

use async_trait::async_trait;

use crate::error::Result;

/// Trait defining the interface for all LLM backends
#[async_trait]
pub trait Completer: Send + Sync {
    /// Send one prompt, get the model's text back
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Check if the backend is available
    async fn health_check(&self) -> bool;

    /// Get the model name being used
    fn model(&self) -> &str;

    /// Get the host URL
    fn host(&self) -> &str;
}

/// Concrete LLM client enum
///
/// Use `LlmClient::from_env()` to create from environment variables.
#[derive(Clone)]
pub enum LlmClient {
    /// Google Gemini (generateContent API)
    Gemini(GeminiBackend),
    /// OpenAI-compatible chat completions (vLLM, LocalAI, llama-server, ...)
    OpenAICompatible(OpenAICompatibleBackend),
    /// Local Ollama server
    Ollama(OllamaBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl LlmClient {
    /// Create an LLM client from environment variables
    ///
    /// Returns None if the selected backend is missing its required variables.
    pub fn from_env() -> Option<Self> {
        let backend = std::env::var("LLM_BACKEND").unwrap_or_else(|_| "gemini".to_string());

        match backend.to_lowercase().as_str() {
            "gemini" | "google" => GeminiBackend::from_env().map(LlmClient::Gemini),
            "openai_compatible" | "openai" | "vllm" | "localai" | "llamacpp" => {
                OpenAICompatibleBackend::from_env().map(LlmClient::OpenAICompatible)
            }
            "ollama" => OllamaBackend::from_env().map(LlmClient::Ollama),
            "mock" => Some(LlmClient::Mock(MockBackend::new())),
            _ => {
                tracing::warn!(backend = %backend, "Unknown LLM_BACKEND, falling back to gemini");
                GeminiBackend::from_env().map(LlmClient::Gemini)
            }
        }
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        LlmClient::Mock(MockBackend::new())
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        match self {
            LlmClient::Gemini(b) => LlmClient::Gemini(b.with_model(model)),
            LlmClient::OpenAICompatible(b) => LlmClient::OpenAICompatible(b.with_model(model)),
            LlmClient::Ollama(b) => LlmClient::Ollama(b.with_model(model)),
            LlmClient::Mock(b) => LlmClient::Mock(b.with_model(model)),
        }
    }

    /// Short backend name (for status output)
    pub fn backend_name(&self) -> &'static str {
        match self {
            LlmClient::Gemini(_) => "gemini",
            LlmClient::OpenAICompatible(_) => "openai_compatible",
            LlmClient::Ollama(_) => "ollama",
            LlmClient::Mock(_) => "mock",
        }
    }
}

// Implement Completer for LlmClient by delegating to the inner backend
#[async_trait]
impl Completer for LlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        match self {
            LlmClient::Gemini(b) => b.complete(prompt).await,
            LlmClient::OpenAICompatible(b) => b.complete(prompt).await,
            LlmClient::Ollama(b) => b.complete(prompt).await,
            LlmClient::Mock(b) => b.complete(prompt).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            LlmClient::Gemini(b) => b.health_check().await,
            LlmClient::OpenAICompatible(b) => b.health_check().await,
            LlmClient::Ollama(b) => b.health_check().await,
            LlmClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            LlmClient::Gemini(b) => b.model(),
            LlmClient::OpenAICompatible(b) => b.model(),
            LlmClient::Ollama(b) => b.model(),
            LlmClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            LlmClient::Gemini(b) => b.host(),
            LlmClient::OpenAICompatible(b) => b.host(),
            LlmClient::Ollama(b) => b.host(),
            LlmClient::Mock(b) => b.host(),
        }
    }
}
