//! Integration tests for buddy-core
//!
//! These tests exercise the store → agent → chat workflow end to end with a
//! local SQLite store and the mock LLM backend.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use buddy_core::{
    spending_overview, Advisor, AgentKind, AnalysisAgent, CallPolicy, ChatRole, ChatSession,
    Error, Expense, ExpenseStore, MockBackend, PromptLibrary, RestStore, SavingsAgent,
    SqliteStore, EMPTY_DISCRETIONARY_MESSAGE, EMPTY_EXPENSES_MESSAGE,
};

fn prompts() -> Arc<RwLock<PromptLibrary>> {
    Arc::new(RwLock::new(PromptLibrary::embedded_only()))
}

fn expense(name: &str, amount: f64) -> Expense {
    Expense::new(name, amount).expect("valid expense")
}

fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

// =============================================================================
// Data Access Layer
// =============================================================================

#[tokio::test]
async fn test_replace_with_duplicates_keeps_both_rows() {
    let store = SqliteStore::in_memory().expect("Failed to create store");

    store
        .replace_recurring_expenses(&[expense("Rent", 1000.0), expense("Rent", 1000.0)])
        .await
        .unwrap();

    let rows = store.list_recurring_expenses().await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.name == "Rent" && r.amount == 1000.0));
}

#[tokio::test]
async fn test_add_then_update_discretionary() {
    let store = SqliteStore::in_memory().unwrap();

    let row = store
        .add_or_update_discretionary_expense("Coffee", 4.5, None)
        .await
        .unwrap();
    assert_eq!(store.list_discretionary_expenses().await.unwrap().len(), 1);

    store
        .add_or_update_discretionary_expense("Coffee", 5.0, row.id)
        .await
        .unwrap();

    let rows = store.list_discretionary_expenses().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].amount, 5.0);
    assert_eq!(rows[0].id, row.id);
}

#[tokio::test]
async fn test_unreachable_store_errors_and_empty_store_is_ok() {
    let policy = CallPolicy {
        timeout: Duration::from_secs(2),
        max_retries: 1,
        backoff: Duration::from_millis(1),
    };
    let unreachable = RestStore::new(&closed_port_url(), "key").with_policy(policy);

    let err = unreachable.list_recurring_expenses().await.unwrap_err();
    assert!(err.is_collaborator_failure());
    assert!(matches!(err, Error::Unreachable { .. } | Error::Unavailable { .. }));

    let empty = SqliteStore::in_memory().unwrap();
    assert_eq!(empty.list_recurring_expenses().await.unwrap(), vec![]);
}

#[test]
fn test_encrypted_database_reopens_with_same_key() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("buddy.db");
    let path = path.to_string_lossy();

    {
        let store = SqliteStore::new_with_key(&path, Some("hunter2")).unwrap();
        assert!(store.path().ends_with("buddy.db"));
    }

    assert!(SqliteStore::new_with_key(&path, Some("hunter2")).is_ok());
    assert!(SqliteStore::new_with_key(&path, Some("wrong")).is_err());
}

// =============================================================================
// Advisory Agents
// =============================================================================

#[tokio::test]
async fn test_analysis_prompt_contains_rows_and_question() {
    let llm = MockBackend::with_reply("Groceries dominate.");
    let agent = AnalysisAgent::with_prompts(llm.clone(), prompts());
    let expenses = [
        expense("Groceries", 120.0),
        expense("Bus pass", 45.0),
        expense("Streaming", 15.99),
    ];

    let answer = agent.analyze(&expenses, "What is my biggest cost?").await.unwrap();
    assert_eq!(answer, "Groceries dominate.");

    let sent = llm.prompts();
    assert_eq!(sent.len(), 1);
    for (name, amount) in [("Groceries", "120.00"), ("Bus pass", "45.00"), ("Streaming", "15.99")] {
        let row = sent[0]
            .lines()
            .filter(|l| l.contains(name) && l.contains(amount))
            .count();
        assert_eq!(row, 1, "row {} should appear exactly once", name);
    }
    assert!(sent[0].contains("What is my biggest cost?"));
}

#[tokio::test]
async fn test_empty_inputs_never_reach_the_llm() {
    let llm = MockBackend::new();
    let analysis = AnalysisAgent::with_prompts(llm.clone(), prompts());
    let savings = SavingsAgent::with_prompts(llm.clone(), prompts());

    assert_eq!(
        analysis.analyze(&[], "anything").await.unwrap(),
        EMPTY_EXPENSES_MESSAGE
    );
    assert_eq!(
        savings
            .suggest(50000.0, &[expense("Rent", 20000.0)], &[])
            .await
            .unwrap(),
        EMPTY_DISCRETIONARY_MESSAGE
    );
    assert_eq!(llm.call_count(), 0);
}

// =============================================================================
// Chat workflow
// =============================================================================

#[tokio::test]
async fn test_chat_session_workflow() {
    let store = SqliteStore::in_memory().unwrap();
    let llm = MockBackend::with_reply("Try meal prepping.");
    let advisor = Advisor::with_prompts(store.clone(), llm.clone(), prompts());

    store
        .replace_recurring_expenses(&[expense("Rent", 1200.0), expense("Phone", 30.0)])
        .await
        .unwrap();
    for (name, amount) in [("Lunch", 14.0), ("Lunch", 12.0), ("Taxi", 22.0)] {
        store
            .add_or_update_discretionary_expense(name, amount, None)
            .await
            .unwrap();
    }

    let mut session = ChatSession::with_income(3000.0).unwrap();
    let first = advisor.reply(&mut session, "Where did my money go?").await;
    let second = advisor.reply(&mut session, "Any tips to save?").await;

    assert_eq!(first.agent, AgentKind::Analysis);
    assert_eq!(second.agent, AgentKind::Savings);
    assert_eq!(llm.call_count(), 2);

    let roles: Vec<ChatRole> = session.transcript().iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            ChatRole::User,
            ChatRole::Assistant,
            ChatRole::User,
            ChatRole::Assistant
        ]
    );

    let recurring: Vec<Expense> = store
        .list_recurring_expenses()
        .await
        .unwrap()
        .into_iter()
        .map(Expense::from)
        .collect();
    let current: Vec<Expense> = store
        .list_discretionary_expenses()
        .await
        .unwrap()
        .into_iter()
        .map(Expense::from)
        .collect();
    let overview = spending_overview(session.income, &recurring, &current);
    let budget = overview.budget.expect("income is set");
    assert!((budget.recommended_daily - 59.0).abs() < 1e-9);
    assert!((budget.current_daily - 1.6).abs() < 1e-9);
    assert_eq!(overview.discretionary_by_name[0].name, "Lunch");
    assert_eq!(overview.discretionary_by_name[0].amount, 26.0);
    assert_eq!(overview.discretionary_by_name[1].name, "Taxi");
}

#[tokio::test]
async fn test_chat_survives_store_outage() {
    let store = RestStore::new(&closed_port_url(), "key")
        .with_policy(CallPolicy::no_retry(Duration::from_secs(1)));
    let llm = MockBackend::new();
    let advisor = Advisor::with_prompts(store, llm.clone(), prompts());

    let mut session = ChatSession::new();
    let turn = advisor.reply(&mut session, "What did I spend?").await;

    assert!(turn.failed);
    assert!(turn.reply.starts_with("Sorry, I encountered an error:"));
    assert_eq!(session.transcript().len(), 2);
    assert_eq!(llm.call_count(), 0);
}
