//! Spending overview: daily budget against actual spending
//!
//! A month is taken as 30 days. What is left of income after recurring costs,
//! spread over the month, is the recommended daily budget; discretionary
//! spending spread the same way is the current daily rate.

use std::collections::HashMap;

use serde::Serialize;

use crate::models::Expense;

pub const DAYS_PER_MONTH: f64 = 30.0;

/// Total spent under one expense name
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NameTotal {
    pub name: String,
    pub amount: f64,
}

/// Daily budget figures for a known income
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyBudget {
    pub income: f64,
    pub recurring_total: f64,
    pub discretionary_total: f64,
    pub recommended_daily: f64,
    pub current_daily: f64,
    /// Negative when spending runs ahead of the recommendation
    pub daily_delta: f64,
}

impl DailyBudget {
    pub fn over_budget(&self) -> bool {
        self.daily_delta < 0.0
    }
}

/// Everything the dashboard shows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpendingOverview {
    /// `None` until a non-zero income is known
    pub budget: Option<DailyBudget>,
    pub income_required: bool,
    /// Discretionary spending by name (pie chart data)
    pub discretionary_by_name: Vec<NameTotal>,
    /// Recurring costs by name (histogram data)
    pub recurring_by_name: Vec<NameTotal>,
}

/// Build the overview; a missing or zero income leaves `budget` empty
pub fn spending_overview(
    income: Option<f64>,
    recurring: &[Expense],
    discretionary: &[Expense],
) -> SpendingOverview {
    let budget = income
        .filter(|i| *i > 0.0)
        .map(|income| daily_budget(income, recurring, discretionary));

    SpendingOverview {
        income_required: budget.is_none(),
        budget,
        discretionary_by_name: totals_by_name(discretionary),
        recurring_by_name: totals_by_name(recurring),
    }
}

pub fn daily_budget(income: f64, recurring: &[Expense], discretionary: &[Expense]) -> DailyBudget {
    let recurring_total: f64 = recurring.iter().map(|e| e.amount).sum();
    let discretionary_total: f64 = discretionary.iter().map(|e| e.amount).sum();

    let recommended_daily = (income - recurring_total) / DAYS_PER_MONTH;
    let current_daily = discretionary_total / DAYS_PER_MONTH;

    DailyBudget {
        income,
        recurring_total,
        discretionary_total,
        recommended_daily,
        current_daily,
        daily_delta: recommended_daily - current_daily,
    }
}

/// Sum amounts per name, largest first (ties by name)
pub fn totals_by_name(expenses: &[Expense]) -> Vec<NameTotal> {
    let mut totals: HashMap<&str, f64> = HashMap::new();
    for expense in expenses {
        *totals.entry(expense.name.as_str()).or_default() += expense.amount;
    }

    let mut totals: Vec<NameTotal> = totals
        .into_iter()
        .map(|(name, amount)| NameTotal {
            name: name.to_string(),
            amount,
        })
        .collect();
    totals.sort_by(|a, b| b.amount.total_cmp(&a.amount).then_with(|| a.name.cmp(&b.name)));
    totals
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expense(name: &str, amount: f64) -> Expense {
        Expense::new(name, amount).unwrap()
    }

    #[test]
    fn test_daily_budget() {
        let budget = daily_budget(
            4000.0,
            &[expense("Rent", 1000.0)],
            &[expense("Coffee", 150.0), expense("Cinema", 300.0)],
        );
        assert_eq!(budget.recommended_daily, 100.0);
        assert_eq!(budget.current_daily, 15.0);
        assert_eq!(budget.daily_delta, 85.0);
        assert!(!budget.over_budget());
    }

    #[test]
    fn test_over_budget() {
        let budget = daily_budget(1500.0, &[expense("Rent", 1200.0)], &[expense("Trip", 600.0)]);
        assert_eq!(budget.recommended_daily, 10.0);
        assert_eq!(budget.current_daily, 20.0);
        assert!(budget.over_budget());
    }

    #[test]
    fn test_income_required() {
        let overview = spending_overview(None, &[], &[expense("Coffee", 3.0)]);
        assert!(overview.income_required);
        assert!(overview.budget.is_none());
        assert_eq!(overview.discretionary_by_name.len(), 1);

        let zero = spending_overview(Some(0.0), &[], &[]);
        assert!(zero.income_required);
    }

    #[test]
    fn test_totals_grouped_and_sorted() {
        let totals = totals_by_name(&[
            expense("Coffee", 4.0),
            expense("Groceries", 60.0),
            expense("Coffee", 5.0),
            expense("Books", 9.0),
        ]);
        assert_eq!(
            totals,
            vec![
                NameTotal {
                    name: "Groceries".into(),
                    amount: 60.0
                },
                NameTotal {
                    name: "Books".into(),
                    amount: 9.0
                },
                NameTotal {
                    name: "Coffee".into(),
                    amount: 9.0
                },
            ]
        );
    }
}
