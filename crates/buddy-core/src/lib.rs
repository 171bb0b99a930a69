//! Budget Buddy Core Library
//!
//! Shared functionality for the Budget Buddy personal finance assistant:
//! - Expense store access (local SQLite or hosted PostgREST)
//! - Advisory agents for expense analysis and savings tips
//! - Pluggable LLM backends (Gemini, OpenAI-compatible servers, Ollama)
//! - Prompt library for customizable prompts
//! - Chat routing and the spending overview
//! - Network timeout/retry policy

pub mod agents;
pub mod ai;
pub mod chat;
pub mod config;
pub mod error;
pub mod models;
pub mod overview;
pub mod prompts;
pub mod store;

/// Test utilities including mock LLM and PostgREST servers
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use agents::{
    error_reply, render_table, AnalysisAgent, SavingsAgent, EMPTY_DISCRETIONARY_MESSAGE,
    EMPTY_EXPENSES_MESSAGE, LLM_NOT_CONFIGURED_MESSAGE,
};
pub use ai::{
    Completer, GeminiBackend, LlmClient, MockBackend, OllamaBackend, OpenAICompatibleBackend,
};
pub use chat::{Advisor, AgentKind, ChatSession, ChatTurn};
pub use config::{CallPolicy, NetworkConfig};
pub use error::{Error, Result};
pub use models::{ChatMessage, ChatRole, Expense, ExpenseKind, ExpenseRecord};
pub use overview::{spending_overview, DailyBudget, NameTotal, SpendingOverview};
pub use prompts::{Prompt, PromptId, PromptInfo, PromptLibrary};
pub use store::{ExpenseStore, RestStore, SqliteStore, StoreBackend, StoreClient};
