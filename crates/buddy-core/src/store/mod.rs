//! Expense data access layer
//!
//! Two logical tables back the app:
//! - `monthly_expenses` - recurring costs, replaced as a whole on every save
//! - `current_expenses` - discretionary spending, added or edited one row at a time
//!
//! # Architecture
//!
//! - `ExpenseStore` trait: the four data operations plus health/name
//! - `StoreClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `SqliteStore` (local file), `RestStore` (hosted PostgREST)
//!
//! # Configuration
//!
//! Environment variables:
//! - `BUDDY_STORE`: Backend to use (sqlite, rest). Default: sqlite
//! - `SUPABASE_URL`, `SUPABASE_KEY`: Hosted store endpoint and key (rest backend)
//! - `BUDDY_DB_KEY`: SQLCipher passphrase (sqlite backend)
//!
//! List operations return a typed error when the store cannot be reached and
//! an empty list when it simply holds no rows; callers must not treat the two
//! alike.

mod rest;
mod sqlite;

pub use rest::RestStore;
pub use sqlite::{SqliteStore, DB_KEY_ENV};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{Expense, ExpenseRecord};

/// Trait defining the interface for all expense stores
#[async_trait]
pub trait ExpenseStore: Send + Sync {
    /// Replace every recurring expense with `expenses` (all or nothing)
    async fn replace_recurring_expenses(&self, expenses: &[Expense]) -> Result<()>;

    /// Insert a discretionary expense, or update row `id` when given
    async fn add_or_update_discretionary_expense(
        &self,
        name: &str,
        amount: f64,
        id: Option<i64>,
    ) -> Result<ExpenseRecord>;

    /// All recurring expenses
    async fn list_recurring_expenses(&self) -> Result<Vec<ExpenseRecord>>;

    /// All discretionary expenses, oldest first
    async fn list_discretionary_expenses(&self) -> Result<Vec<ExpenseRecord>>;

    /// Check if the store is reachable
    async fn health_check(&self) -> bool;

    /// Backend description (for logging)
    fn name(&self) -> &str;
}

/// Which backend to open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite,
    Rest,
}

impl StoreBackend {
    /// Read `BUDDY_STORE` (defaults to sqlite)
    pub fn from_env() -> Self {
        let raw = std::env::var("BUDDY_STORE").unwrap_or_else(|_| "sqlite".to_string());
        raw.parse().unwrap_or_else(|e: String| {
            tracing::warn!(error = %e, "Unknown BUDDY_STORE, falling back to sqlite");
            StoreBackend::Sqlite
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Rest => "rest",
        }
    }
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" | "local" => Ok(Self::Sqlite),
            "rest" | "supabase" | "postgrest" => Ok(Self::Rest),
            _ => Err(format!("Unknown store backend: {}", s)),
        }
    }
}

/// Concrete store enum
#[derive(Clone)]
pub enum StoreClient {
    /// Local SQLite file
    Sqlite(SqliteStore),
    /// Hosted PostgREST (Supabase) tables
    Rest(RestStore),
}

impl StoreClient {
    /// Open the requested backend
    ///
    /// `db_path` and `no_encrypt` only apply to the sqlite backend; the rest
    /// backend is configured from `SUPABASE_URL` / `SUPABASE_KEY`.
    pub fn open(backend: StoreBackend, db_path: &str, no_encrypt: bool) -> Result<Self> {
        match backend {
            StoreBackend::Sqlite => {
                let store = if no_encrypt {
                    SqliteStore::new_unencrypted(db_path)?
                } else {
                    SqliteStore::new(db_path)?
                };
                Ok(StoreClient::Sqlite(store))
            }
            StoreBackend::Rest => RestStore::from_env().map(StoreClient::Rest).ok_or_else(|| {
                Error::Config("Hosted store requires SUPABASE_URL and SUPABASE_KEY".into())
            }),
        }
    }
}

/// Reject rows a store must never persist
pub(crate) fn ensure_named(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::Validation("expense name must not be empty".into()));
    }
    Ok(())
}

// Implement ExpenseStore for StoreClient by delegating to the inner backend
#[async_trait]
impl ExpenseStore for StoreClient {
    async fn replace_recurring_expenses(&self, expenses: &[Expense]) -> Result<()> {
        match self {
            StoreClient::Sqlite(s) => s.replace_recurring_expenses(expenses).await,
            StoreClient::Rest(s) => s.replace_recurring_expenses(expenses).await,
        }
    }

    async fn add_or_update_discretionary_expense(
        &self,
        name: &str,
        amount: f64,
        id: Option<i64>,
    ) -> Result<ExpenseRecord> {
        match self {
            StoreClient::Sqlite(s) => s.add_or_update_discretionary_expense(name, amount, id).await,
            StoreClient::Rest(s) => s.add_or_update_discretionary_expense(name, amount, id).await,
        }
    }

    async fn list_recurring_expenses(&self) -> Result<Vec<ExpenseRecord>> {
        match self {
            StoreClient::Sqlite(s) => s.list_recurring_expenses().await,
            StoreClient::Rest(s) => s.list_recurring_expenses().await,
        }
    }

    async fn list_discretionary_expenses(&self) -> Result<Vec<ExpenseRecord>> {
        match self {
            StoreClient::Sqlite(s) => s.list_discretionary_expenses().await,
            StoreClient::Rest(s) => s.list_discretionary_expenses().await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            StoreClient::Sqlite(s) => s.health_check().await,
            StoreClient::Rest(s) => s.health_check().await,
        }
    }

    fn name(&self) -> &str {
        match self {
            StoreClient::Sqlite(s) => s.name(),
            StoreClient::Rest(s) => s.name(),
        }
    }
}
