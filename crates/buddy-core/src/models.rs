//! Domain models for Budget Buddy

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An expense as entered by the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub name: String,
    pub amount: f64,
}

impl Expense {
    /// Build a validated expense (trimmed non-empty name, finite non-negative amount)
    pub fn new(name: &str, amount: f64) -> Result<Self> {
        let expense = Self {
            name: name.trim().to_string(),
            amount,
        };
        expense.validate()?;
        Ok(expense)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("expense name must not be empty".into()));
        }
        if !self.amount.is_finite() {
            return Err(Error::Validation(format!(
                "amount for '{}' is not a number",
                self.name
            )));
        }
        if self.amount < 0.0 {
            return Err(Error::Validation(format!(
                "amount for '{}' must not be negative",
                self.name
            )));
        }
        Ok(())
    }

    /// A row left blank in a setup form (no name, or nothing spent)
    pub fn is_blank(&self) -> bool {
        self.name.trim().is_empty() || self.amount <= 0.0
    }
}

/// An expense row as held by a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    /// Row id (always set for discretionary rows)
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    pub amount: f64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl ExpenseRecord {
    pub fn expense(&self) -> Expense {
        Expense {
            name: self.name.clone(),
            amount: self.amount,
        }
    }
}

impl From<ExpenseRecord> for Expense {
    fn from(record: ExpenseRecord) -> Self {
        Self {
            name: record.name,
            amount: record.amount,
        }
    }
}

/// Which table an expense lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseKind {
    /// Fixed monthly costs (rent, utilities)
    Recurring,
    /// Day-to-day spending
    Discretionary,
}

impl ExpenseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recurring => "recurring",
            Self::Discretionary => "discretionary",
        }
    }

    /// Backing table name, shared by every store backend
    pub fn table(&self) -> &'static str {
        match self {
            Self::Recurring => "monthly_expenses",
            Self::Discretionary => "current_expenses",
        }
    }
}

impl std::str::FromStr for ExpenseKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "recurring" | "monthly" => Ok(Self::Recurring),
            "discretionary" | "current" => Ok(Self::Discretionary),
            _ => Err(format!("Unknown expense kind: {}", s)),
        }
    }
}

impl std::fmt::Display for ExpenseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One entry of a chat transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}
