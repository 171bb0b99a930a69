//! Spending overview handler

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};

use buddy_core::{spending_overview, Expense, ExpenseStore, SpendingOverview};

use crate::{AppError, AppState};

/// GET /api/sessions/:id/overview - Daily budget and breakdowns for the session income
pub async fn get_overview(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SpendingOverview>, AppError> {
    let income = state
        .sessions
        .income(&id)
        .await
        .ok_or_else(|| AppError::not_found(&format!("Session not found or expired: {}", id)))?;

    let recurring: Vec<Expense> = state
        .store
        .list_recurring_expenses()
        .await?
        .into_iter()
        .map(Expense::from)
        .collect();
    let discretionary: Vec<Expense> = state
        .store
        .list_discretionary_expenses()
        .await?
        .into_iter()
        .map(Expense::from)
        .collect();

    Ok(Json(spending_overview(income, &recurring, &discretionary)))
}
