//! Local SQLite store with connection pooling

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use tracing::{debug, info};

use super::{ensure_named, ExpenseStore};
use crate::error::{Error, Result};
use crate::models::{Expense, ExpenseKind, ExpenseRecord};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "BUDDY_DB_KEY";

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the same key,
/// regardless of database path.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Changing this invalidates every existing encrypted database
    const APP_SALT: &[u8; 16] = b"buddy-salt-v1-ok";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Parse a SQLite datetime string into a DateTime<Utc>
fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // SQLite stores as "YYYY-MM-DD HH:MM:SS" format
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .ok()
}

/// SQLite-backed expense store
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
    db_path: String,
    label: String,
}

impl SqliteStore {
    /// Open an encrypted database
    ///
    /// Requires `BUDDY_DB_KEY`. Use `new_unencrypted()` for development/testing.
    pub fn new(path: &str) -> Result<Self> {
        match std::env::var(DB_KEY_ENV).ok() {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases.",
                DB_KEY_ENV
            ))),
        }
    }

    /// Open an unencrypted database (development/testing only)
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Open a database with an explicit encryption passphrase
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);

        let pool = if let Some(pass) = passphrase {
            let key = derive_key(pass)?;
            let key_pragma = format!("PRAGMA key = 'x\"{}\"';", key);

            // The key must be set on every new connection
            let manager = manager.with_init(move |conn| {
                conn.execute_batch(&key_pragma)?;
                Ok(())
            });

            Pool::builder().max_size(4).build(manager)?
        } else {
            Pool::builder().max_size(4).build(manager)?
        };

        let store = Self {
            pool,
            db_path: path.to_string(),
            label: format!("sqlite:{}", path),
        };
        store.run_migrations()?;
        info!(path = %path, encrypted = passphrase.is_some(), "Opened expense database");

        Ok(store)
    }

    /// Create a throwaway database (for testing)
    ///
    /// Uses a temporary file rather than `:memory:` because each pooled
    /// connection would otherwise see its own empty database.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "buddy_test_{}_{}.db",
            std::process::id(),
            id
        ));
        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path.to_string_lossy())
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Create the expense tables if missing
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;

            -- Recurring monthly costs (rent, utilities, insurance)
            CREATE TABLE IF NOT EXISTS monthly_expenses (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                amount REAL NOT NULL CHECK (amount >= 0)
            );

            -- Day-to-day discretionary spending
            CREATE TABLE IF NOT EXISTS current_expenses (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                amount REAL NOT NULL CHECK (amount >= 0),
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_current_expenses_created ON current_expenses(created_at);
            "#,
        )?;

        Ok(())
    }

    fn list(&self, kind: ExpenseKind) -> Result<Vec<ExpenseRecord>> {
        let conn = self.conn()?;
        let sql = match kind {
            ExpenseKind::Recurring => {
                "SELECT id, name, amount, NULL FROM monthly_expenses ORDER BY id"
            }
            ExpenseKind::Discretionary => {
                "SELECT id, name, amount, created_at FROM current_expenses ORDER BY id"
            }
        };
        let mut stmt = conn.prepare(sql)?;

        let records = stmt
            .query_map([], |row| {
                let created_at: Option<String> = row.get(3)?;
                Ok(ExpenseRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    amount: row.get(2)?,
                    created_at: created_at.as_deref().and_then(parse_datetime),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn get_discretionary(&self, conn: &DbConn, id: i64) -> Result<Option<ExpenseRecord>> {
        let record = conn
            .query_row(
                "SELECT id, name, amount, created_at FROM current_expenses WHERE id = ?",
                params![id],
                |row| {
                    let created_at: Option<String> = row.get(3)?;
                    Ok(ExpenseRecord {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        amount: row.get(2)?,
                        created_at: created_at.as_deref().and_then(parse_datetime),
                    })
                },
            )
            .optional()?;
        Ok(record)
    }
}

#[async_trait]
impl ExpenseStore for SqliteStore {
    async fn replace_recurring_expenses(&self, expenses: &[Expense]) -> Result<()> {
        for expense in expenses {
            ensure_named(&expense.name)?;
        }

        let mut conn = self.conn()?;
        // Delete and insert commit together or not at all
        let tx = conn.transaction()?;
        let removed = tx.execute("DELETE FROM monthly_expenses", [])?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO monthly_expenses (name, amount) VALUES (?, ?)")?;
            for expense in expenses {
                stmt.execute(params![expense.name, expense.amount])?;
            }
        }
        tx.commit()?;

        debug!(removed, inserted = expenses.len(), "Replaced recurring expenses");
        Ok(())
    }

    async fn add_or_update_discretionary_expense(
        &self,
        name: &str,
        amount: f64,
        id: Option<i64>,
    ) -> Result<ExpenseRecord> {
        ensure_named(name)?;
        let conn = self.conn()?;

        let row_id = match id {
            Some(id) => {
                let changed = conn.execute(
                    "UPDATE current_expenses SET name = ?, amount = ? WHERE id = ?",
                    params![name, amount, id],
                )?;
                if changed == 0 {
                    return Err(Error::NotFound(format!("discretionary expense {}", id)));
                }
                id
            }
            None => {
                conn.execute(
                    "INSERT INTO current_expenses (name, amount) VALUES (?, ?)",
                    params![name, amount],
                )?;
                conn.last_insert_rowid()
            }
        };

        self.get_discretionary(&conn, row_id)?
            .ok_or_else(|| Error::NotFound(format!("discretionary expense {}", row_id)))
    }

    async fn list_recurring_expenses(&self) -> Result<Vec<ExpenseRecord>> {
        self.list(ExpenseKind::Recurring)
    }

    async fn list_discretionary_expenses(&self) -> Result<Vec<ExpenseRecord>> {
        self.list(ExpenseKind::Discretionary)
    }

    async fn health_check(&self) -> bool {
        self.conn()
            .and_then(|conn| Ok(conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?))
            .is_ok()
    }

    fn name(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rent() -> Expense {
        Expense::new("Rent", 1000.0).unwrap()
    }

    #[tokio::test]
    async fn test_empty_store_lists_nothing() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.list_recurring_expenses().await.unwrap().is_empty());
        assert!(store.list_discretionary_expenses().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_keeps_duplicates() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .replace_recurring_expenses(&[rent(), rent()])
            .await
            .unwrap();

        let rows = store.list_recurring_expenses().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.name == "Rent" && r.amount == 1000.0));
    }

    #[tokio::test]
    async fn test_replace_discards_previous_set() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .replace_recurring_expenses(&[rent(), Expense::new("Internet", 60.0).unwrap()])
            .await
            .unwrap();
        store
            .replace_recurring_expenses(&[Expense::new("Insurance", 120.0).unwrap()])
            .await
            .unwrap();

        let rows = store.list_recurring_expenses().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Insurance");
    }

    #[tokio::test]
    async fn test_failed_replace_leaves_previous_rows() {
        let store = SqliteStore::in_memory().unwrap();
        store.replace_recurring_expenses(&[rent()]).await.unwrap();

        // Second row violates the amount check, so the whole replace rolls back
        let bad = Expense {
            name: "Refund".into(),
            amount: -5.0,
        };
        let result = store
            .replace_recurring_expenses(&[Expense::new("Gym", 30.0).unwrap(), bad])
            .await;
        assert!(matches!(result, Err(Error::Database(_))));

        let rows = store.list_recurring_expenses().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Rent");
    }

    #[tokio::test]
    async fn test_replace_rejects_unnamed_rows_before_deleting() {
        let store = SqliteStore::in_memory().unwrap();
        store.replace_recurring_expenses(&[rent()]).await.unwrap();

        let unnamed = Expense {
            name: " ".into(),
            amount: 10.0,
        };
        assert!(matches!(
            store.replace_recurring_expenses(&[unnamed]).await,
            Err(Error::Validation(_))
        ));
        assert_eq!(store.list_recurring_expenses().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_then_update_in_place() {
        let store = SqliteStore::in_memory().unwrap();

        let added = store
            .add_or_update_discretionary_expense("Coffee", 4.5, None)
            .await
            .unwrap();
        let id = added.id.expect("inserted row has an id");
        assert_eq!(added.amount, 4.5);
        assert!(added.created_at.is_some());

        let updated = store
            .add_or_update_discretionary_expense("Coffee", 5.0, Some(id))
            .await
            .unwrap();
        assert_eq!(updated.id, Some(id));
        assert_eq!(updated.amount, 5.0);

        let rows = store.list_discretionary_expenses().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amount, 5.0);
    }

    #[tokio::test]
    async fn test_update_missing_row() {
        let store = SqliteStore::in_memory().unwrap();
        let result = store
            .add_or_update_discretionary_expense("Coffee", 5.0, Some(42))
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert!(store.list_discretionary_expenses().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_requires_name() {
        let store = SqliteStore::in_memory().unwrap();
        let result = store.add_or_update_discretionary_expense("", 5.0, None).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_new_requires_key() {
        // Only meaningful when the developer has not exported a key
        if std::env::var(DB_KEY_ENV).is_err() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("buddy.db");
            assert!(matches!(
                SqliteStore::new(&path.to_string_lossy()),
                Err(Error::Encryption(_))
            ));
        }
    }

    #[test]
    fn test_derive_key_is_stable() {
        let a = derive_key("correct horse").unwrap();
        let b = derive_key("correct horse").unwrap();
        let c = derive_key("battery staple").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_parse_datetime() {
        assert!(parse_datetime("2024-03-01 12:30:00").is_some());
        assert!(parse_datetime("yesterday").is_none());
    }
}
