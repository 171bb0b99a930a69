//! Hosted store backend speaking the PostgREST dialect (Supabase)
//!
//! Each table is exposed at `{SUPABASE_URL}/rest/v1/{table}`. Requests carry the
//! project key both as `apikey` and as a bearer token.
//!
//! PostgREST has no multi-statement transactions, so replacing the recurring set
//! snapshots the old rows first and writes them back if the insert fails.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use tracing::{debug, error, warn};

use super::{ensure_named, ExpenseStore};
use crate::config::{CallPolicy, NetworkConfig};
use crate::error::{ensure_success, Error, Result};
use crate::models::{Expense, ExpenseKind, ExpenseRecord};

const SERVICE: &str = "expense store";

/// Hosted PostgREST store
#[derive(Clone)]
pub struct RestStore {
    http_client: Client,
    base_url: String,
    api_key: String,
    policy: CallPolicy,
    label: String,
}

#[derive(Serialize)]
struct ExpenseBody<'a> {
    name: &'a str,
    amount: f64,
}

impl RestStore {
    /// Create a store for the given project URL and key
    pub fn new(base_url: &str, api_key: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            http_client: Client::new(),
            label: format!("rest:{}", base_url),
            base_url,
            api_key: api_key.to_string(),
            policy: NetworkConfig::default().store,
        }
    }

    /// Replace the timeout/retry policy
    pub fn with_policy(mut self, policy: CallPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Create from environment variables
    ///
    /// Required: `SUPABASE_URL`, `SUPABASE_KEY`
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("SUPABASE_URL").ok()?;
        let key = std::env::var("SUPABASE_KEY").ok()?;
        Some(Self::new(&url, &key).with_policy(NetworkConfig::load_or_default().store))
    }

    fn table_url(&self, kind: ExpenseKind) -> String {
        format!("{}/rest/v1/{}", self.base_url, kind.table())
    }

    /// Authenticate and send, turning non-2xx answers into `Error::Upstream`
    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| Error::from_http(SERVICE, e))?;
        ensure_success(SERVICE, response).await
    }

    async fn rows(response: Response) -> Result<Vec<ExpenseRecord>> {
        response
            .json::<Vec<ExpenseRecord>>()
            .await
            .map_err(|e| Error::from_http(SERVICE, e))
    }

    async fn fetch(&self, kind: ExpenseKind) -> Result<Vec<ExpenseRecord>> {
        let url = &self.table_url(kind);
        let query: &[(&str, &str)] = match kind {
            ExpenseKind::Recurring => &[("select", "*")],
            ExpenseKind::Discretionary => &[("select", "*"), ("order", "id.asc")],
        };

        self.policy
            .run(SERVICE, true, || async move {
                let response = self.send(self.http_client.get(url).query(query)).await?;
                Self::rows(response).await
            })
            .await
    }

    async fn insert(&self, kind: ExpenseKind, expenses: &[Expense]) -> Result<Vec<ExpenseRecord>> {
        let url = &self.table_url(kind);
        let body: &Vec<ExpenseBody<'_>> = &expenses
            .iter()
            .map(|e| ExpenseBody {
                name: &e.name,
                amount: e.amount,
            })
            .collect();

        self.policy
            .run(SERVICE, false, || async move {
                let request = self
                    .http_client
                    .post(url)
                    .header("Prefer", "return=representation")
                    .json(body);
                Self::rows(self.send(request).await?).await
            })
            .await
    }

    async fn delete_all(&self, kind: ExpenseKind) -> Result<()> {
        let url = &self.table_url(kind);

        // PostgREST refuses unfiltered deletes; every row has a name
        self.policy
            .run(SERVICE, true, || async move {
                self.send(self.http_client.delete(url).query(&[("name", "not.is.null")]))
                    .await
                    .map(|_| ())
            })
            .await
    }

    async fn update(&self, id: i64, name: &str, amount: f64) -> Result<ExpenseRecord> {
        let url = &self.table_url(ExpenseKind::Discretionary);
        let filter = &format!("eq.{}", id);
        let body = &ExpenseBody { name, amount };

        // Writing the same values twice is harmless, so updates may retry
        let rows = self
            .policy
            .run(SERVICE, true, || async move {
                let request = self
                    .http_client
                    .patch(url)
                    .query(&[("id", filter.as_str())])
                    .header("Prefer", "return=representation")
                    .json(body);
                Self::rows(self.send(request).await?).await
            })
            .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("discretionary expense {}", id)))
    }
}

#[async_trait]
impl ExpenseStore for RestStore {
    async fn replace_recurring_expenses(&self, expenses: &[Expense]) -> Result<()> {
        for expense in expenses {
            ensure_named(&expense.name)?;
        }

        let previous = self.fetch(ExpenseKind::Recurring).await?;
        self.delete_all(ExpenseKind::Recurring).await?;

        if expenses.is_empty() {
            debug!(removed = previous.len(), "Cleared recurring expenses");
            return Ok(());
        }

        match self.insert(ExpenseKind::Recurring, expenses).await {
            Ok(inserted) => {
                debug!(
                    removed = previous.len(),
                    inserted = inserted.len(),
                    "Replaced recurring expenses"
                );
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, rows = previous.len(), "Insert failed, restoring previous recurring expenses");
                let snapshot: Vec<Expense> = previous.into_iter().map(Expense::from).collect();
                if !snapshot.is_empty() {
                    if let Err(restore_err) =
                        self.insert(ExpenseKind::Recurring, &snapshot).await
                    {
                        error!(error = %restore_err, "Failed to restore recurring expenses");
                    }
                }
                Err(err)
            }
        }
    }

    async fn add_or_update_discretionary_expense(
        &self,
        name: &str,
        amount: f64,
        id: Option<i64>,
    ) -> Result<ExpenseRecord> {
        ensure_named(name)?;

        match id {
            Some(id) => self.update(id, name, amount).await,
            None => {
                let expense = Expense {
                    name: name.to_string(),
                    amount,
                };
                self.insert(ExpenseKind::Discretionary, std::slice::from_ref(&expense))
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| {
                        Error::InvalidData("store did not return the inserted row".into())
                    })
            }
        }
    }

    async fn list_recurring_expenses(&self) -> Result<Vec<ExpenseRecord>> {
        self.fetch(ExpenseKind::Recurring).await
    }

    async fn list_discretionary_expenses(&self) -> Result<Vec<ExpenseRecord>> {
        self.fetch(ExpenseKind::Discretionary).await
    }

    async fn health_check(&self) -> bool {
        let request = self
            .http_client
            .get(self.table_url(ExpenseKind::Recurring))
            .query(&[("select", "name"), ("limit", "1")])
            .timeout(self.policy.timeout);
        self.send(request).await.is_ok()
    }

    fn name(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockRestServer;
    use std::time::Duration;

    fn closed_port_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{}", port)
    }

    fn fast_policy() -> CallPolicy {
        CallPolicy {
            timeout: Duration::from_secs(2),
            max_retries: 1,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_unreachable_store_is_an_error_not_empty() {
        let store = RestStore::new(&closed_port_url(), "key").with_policy(fast_policy());

        let result = store.list_discretionary_expenses().await;
        assert!(matches!(result, Err(Error::Unreachable { .. })));
        assert!(!store.health_check().await);
    }

    #[tokio::test]
    async fn test_round_trip_through_mock() {
        let server = MockRestServer::start("secret").await;
        let store = RestStore::new(&server.url(), "secret").with_policy(fast_policy());

        assert!(store.list_recurring_expenses().await.unwrap().is_empty());

        store
            .replace_recurring_expenses(&[
                Expense::new("Rent", 1000.0).unwrap(),
                Expense::new("Internet", 60.0).unwrap(),
            ])
            .await
            .unwrap();
        let recurring = store.list_recurring_expenses().await.unwrap();
        assert_eq!(recurring.len(), 2);

        let added = store
            .add_or_update_discretionary_expense("Coffee", 4.5, None)
            .await
            .unwrap();
        let id = added.id.unwrap();
        let updated = store
            .add_or_update_discretionary_expense("Coffee", 5.0, Some(id))
            .await
            .unwrap();
        assert_eq!(updated.amount, 5.0);

        let current = store.list_discretionary_expenses().await.unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].amount, 5.0);
    }

    #[tokio::test]
    async fn test_update_missing_row_is_not_found() {
        let server = MockRestServer::start("secret").await;
        let store = RestStore::new(&server.url(), "secret").with_policy(fast_policy());

        let result = store
            .add_or_update_discretionary_expense("Coffee", 5.0, Some(99))
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_failed_insert_restores_snapshot() {
        let server = MockRestServer::start("secret").await;
        let store = RestStore::new(&server.url(), "secret").with_policy(fast_policy());

        store
            .replace_recurring_expenses(&[Expense::new("Rent", 1000.0).unwrap()])
            .await
            .unwrap();

        // The mock rejects negative amounts the way a check constraint would
        let bad = Expense {
            name: "Refund".into(),
            amount: -10.0,
        };
        let result = store.replace_recurring_expenses(&[bad]).await;
        assert!(matches!(result, Err(Error::Upstream { status: 400, .. })));

        let rows = store.list_recurring_expenses().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Rent");
        assert_eq!(rows[0].amount, 1000.0);
    }

    #[tokio::test]
    async fn test_wrong_key_is_rejected() {
        let server = MockRestServer::start("secret").await;
        let store = RestStore::new(&server.url(), "wrong").with_policy(fast_policy());

        let result = store.list_recurring_expenses().await;
        assert!(matches!(result, Err(Error::Upstream { status: 401, .. })));
        assert!(!store.health_check().await);
    }
}
