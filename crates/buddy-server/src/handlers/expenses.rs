//! Expense handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use buddy_core::{Expense, ExpenseRecord, ExpenseStore};

use crate::{AppError, AppState};

#[derive(Debug, Deserialize)]
pub struct ExpenseInput {
    pub name: String,
    pub amount: f64,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceRecurringRequest {
    pub expenses: Vec<ExpenseInput>,
}

#[derive(Debug, Serialize)]
pub struct ReplaceRecurringResponse {
    pub saved: usize,
    /// Blank rows dropped before saving
    pub skipped: usize,
    pub expenses: Vec<ExpenseRecord>,
}

/// GET /api/expenses/recurring
pub async fn list_recurring(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ExpenseRecord>>, AppError> {
    Ok(Json(state.store.list_recurring_expenses().await?))
}

/// PUT /api/expenses/recurring - replace the whole recurring table
///
/// Rows without a name or with a zero amount are treated as unfilled form
/// rows and dropped; at least one real row is required.
pub async fn replace_recurring(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReplaceRecurringRequest>,
) -> Result<Json<ReplaceRecurringResponse>, AppError> {
    let submitted = req.expenses.len();
    let expenses = req
        .expenses
        .into_iter()
        .map(|e| Expense {
            name: e.name.trim().to_string(),
            amount: e.amount,
        })
        .filter(|e| !e.is_blank())
        .map(|e| e.validate().map(|_| e))
        .collect::<buddy_core::Result<Vec<_>>>()?;

    if expenses.is_empty() {
        return Err(buddy_core::Error::EmptyInput(
            "please enter at least one valid expense".into(),
        )
        .into());
    }

    state.store.replace_recurring_expenses(&expenses).await?;
    info!(
        saved = expenses.len(),
        skipped = submitted - expenses.len(),
        "Recurring expenses replaced"
    );

    Ok(Json(ReplaceRecurringResponse {
        saved: expenses.len(),
        skipped: submitted - expenses.len(),
        expenses: state.store.list_recurring_expenses().await?,
    }))
}

/// GET /api/expenses/discretionary
pub async fn list_discretionary(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ExpenseRecord>>, AppError> {
    Ok(Json(state.store.list_discretionary_expenses().await?))
}

/// POST /api/expenses/discretionary
pub async fn add_discretionary(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ExpenseInput>,
) -> Result<(StatusCode, Json<ExpenseRecord>), AppError> {
    let expense = Expense::new(&req.name, req.amount)?;
    let record = state
        .store
        .add_or_update_discretionary_expense(&expense.name, expense.amount, None)
        .await?;

    info!(id = ?record.id, name = %record.name, "Discretionary expense added");
    Ok((StatusCode::CREATED, Json(record)))
}

/// PUT /api/expenses/discretionary/:id
pub async fn update_discretionary(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<ExpenseInput>,
) -> Result<Json<ExpenseRecord>, AppError> {
    let expense = Expense::new(&req.name, req.amount)?;
    let record = state
        .store
        .add_or_update_discretionary_expense(&expense.name, expense.amount, Some(id))
        .await?;

    info!(id, name = %record.name, "Discretionary expense updated");
    Ok(Json(record))
}
