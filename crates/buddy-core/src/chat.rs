//! Chat routing and session context
//!
//! A chat turn picks an agent from the message text, loads the expense data
//! that agent needs and renders whatever comes back (including failures) as the
//! assistant reply. A turn always appends exactly one user message and one
//! assistant message to the transcript.

use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::{info, warn};

use crate::agents::{error_reply, AnalysisAgent, SavingsAgent};
use crate::ai::Completer;
use crate::error::{Error, Result};
use crate::models::{ChatMessage, Expense};
use crate::prompts::PromptLibrary;
use crate::store::ExpenseStore;

/// Words that route a message to the savings agent
const SAVINGS_KEYWORDS: &[&str] = &["save", "tip", "suggest"];

/// Which agent answers a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Analysis,
    Savings,
}

impl AgentKind {
    /// Savings when the message mentions saving, tips or suggestions
    pub fn for_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        if SAVINGS_KEYWORDS.iter().any(|k| lower.contains(k)) {
            AgentKind::Savings
        } else {
            AgentKind::Analysis
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Savings => "savings",
        }
    }
}

/// Per-user conversation state
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatSession {
    /// Monthly income, if the user has given one
    pub income: Option<f64>,
    transcript: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_income(income: f64) -> Result<Self> {
        let mut session = Self::new();
        session.set_income(income)?;
        Ok(session)
    }

    pub fn set_income(&mut self, income: f64) -> Result<()> {
        if !income.is_finite() || income < 0.0 {
            return Err(Error::Validation(
                "income must be a non-negative number".into(),
            ));
        }
        self.income = Some(income);
        Ok(())
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    /// Append one completed turn
    pub fn record(&mut self, user: &str, assistant: &str) {
        self.transcript.push(ChatMessage::user(user));
        self.transcript.push(ChatMessage::assistant(assistant));
    }

    /// Drop the oldest turns so at most `max_messages` remain
    pub fn truncate_front(&mut self, max_messages: usize) {
        if self.transcript.len() > max_messages {
            // Keep user/assistant pairs together
            let excess = self.transcript.len() - max_messages;
            let drop = excess + excess % 2;
            self.transcript.drain(..drop.min(self.transcript.len()));
        }
    }
}

/// Outcome of one chat turn
#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub agent: AgentKind,
    pub reply: String,
    /// Whether the reply is a rendered failure rather than advice
    pub failed: bool,
}

/// Routes chat messages to the advisory agents
pub struct Advisor<S, C> {
    store: S,
    analysis: AnalysisAgent<C>,
    savings: SavingsAgent<C>,
}

impl<S: ExpenseStore, C: Completer + Clone> Advisor<S, C> {
    pub fn new(store: S, llm: C) -> Self {
        Self::with_prompts(store, llm, Arc::new(RwLock::new(PromptLibrary::new())))
    }

    pub fn with_prompts(store: S, llm: C, prompts: Arc<RwLock<PromptLibrary>>) -> Self {
        Self {
            store,
            analysis: AnalysisAgent::with_prompts(llm.clone(), prompts.clone()),
            savings: SavingsAgent::with_prompts(llm, prompts),
        }
    }

    /// Answer one message without touching any transcript
    ///
    /// Never fails: store and LLM errors come back as a rendered reply.
    pub async fn respond(&self, income: Option<f64>, message: &str) -> ChatTurn {
        let agent = AgentKind::for_message(message);
        let result = match agent {
            AgentKind::Analysis => self.run_analysis(message).await,
            AgentKind::Savings => self.run_savings(income.unwrap_or(0.0)).await,
        };

        match result {
            Ok(reply) => {
                info!(agent = agent.as_str(), "Chat turn answered");
                ChatTurn {
                    agent,
                    reply,
                    failed: false,
                }
            }
            Err(err) => {
                warn!(agent = agent.as_str(), error = %err, "Chat turn failed");
                ChatTurn {
                    agent,
                    reply: error_reply(&err),
                    failed: true,
                }
            }
        }
    }

    /// Answer one message and append the turn to `session`
    pub async fn reply(&self, session: &mut ChatSession, message: &str) -> ChatTurn {
        let turn = self.respond(session.income, message).await;
        session.record(message, &turn.reply);
        turn
    }

    async fn run_analysis(&self, question: &str) -> Result<String> {
        let current = to_expenses(self.store.list_discretionary_expenses().await?);
        self.analysis.analyze(&current, question).await
    }

    async fn run_savings(&self, income: f64) -> Result<String> {
        let recurring = to_expenses(self.store.list_recurring_expenses().await?);
        let current = to_expenses(self.store.list_discretionary_expenses().await?);
        self.savings.suggest(income, &recurring, &current).await
    }
}

fn to_expenses(records: Vec<crate::models::ExpenseRecord>) -> Vec<Expense> {
    records.into_iter().map(Expense::from).collect()
}
