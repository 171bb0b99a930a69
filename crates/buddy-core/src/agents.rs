//! Advisory agents
//!
//! Each agent renders one prompt from the user's expense data and forwards it
//! to the LLM in a single `complete` call. Agents hold no state between calls.
//! Empty input is answered locally with a fixed message and never reaches the
//! model.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::ai::Completer;
use crate::error::{Error, Result};
use crate::models::Expense;
use crate::prompts::{PromptId, PromptLibrary};

/// Reply when there is nothing to analyze
pub const EMPTY_EXPENSES_MESSAGE: &str =
    "There is no expense data to analyze yet. Please add some expenses first.";

/// Reply when savings advice is asked for without discretionary spending
pub const EMPTY_DISCRETIONARY_MESSAGE: &str =
    "I need some current expense data to give you the best advice. Try adding a few expenses first!";

/// Reply when no LLM backend is configured
pub const LLM_NOT_CONFIGURED_MESSAGE: &str =
    "LLM Agent not initialized. Please check your API key.";

/// Render a failure as a chat reply
pub fn error_reply(err: &Error) -> String {
    format!("Sorry, I encountered an error: {}", err)
}

/// Render expenses as a plain `name`/`amount` table
///
/// Both columns are right-aligned and there is no index column.
pub fn render_table(expenses: &[Expense]) -> String {
    let amounts: Vec<String> = expenses
        .iter()
        .map(|e| format!("{:.2}", e.amount))
        .collect();

    let name_width = expenses
        .iter()
        .map(|e| e.name.chars().count())
        .chain(std::iter::once("name".len()))
        .max()
        .unwrap_or_default();
    let amount_width = amounts
        .iter()
        .map(|a| a.len())
        .chain(std::iter::once("amount".len()))
        .max()
        .unwrap_or_default();

    let mut lines = Vec::with_capacity(expenses.len() + 1);
    lines.push(format!(
        "{:>nw$}  {:>aw$}",
        "name",
        "amount",
        nw = name_width,
        aw = amount_width
    ));
    for (expense, amount) in expenses.iter().zip(&amounts) {
        lines.push(format!(
            "{:>nw$}  {:>aw$}",
            expense.name,
            amount,
            nw = name_width,
            aw = amount_width
        ));
    }
    lines.join("\n")
}

fn render_prompt(
    prompts: &RwLock<PromptLibrary>,
    id: PromptId,
    vars: &HashMap<&str, &str>,
) -> Result<String> {
    let mut library = prompts
        .write()
        .map_err(|_| Error::InvalidData("Failed to acquire prompt library lock".into()))?;
    Ok(library.get(id)?.render(vars))
}

/// Answers free-form questions about discretionary spending
pub struct AnalysisAgent<C> {
    llm: C,
    prompts: Arc<RwLock<PromptLibrary>>,
}

impl<C: Completer> AnalysisAgent<C> {
    pub fn new(llm: C) -> Self {
        Self::with_prompts(llm, Arc::new(RwLock::new(PromptLibrary::new())))
    }

    pub fn with_prompts(llm: C, prompts: Arc<RwLock<PromptLibrary>>) -> Self {
        Self { llm, prompts }
    }

    /// The exact prompt `analyze` would send
    pub fn build_prompt(&self, expenses: &[Expense], question: &str) -> Result<String> {
        let table = render_table(expenses);
        let mut vars = HashMap::new();
        vars.insert("expenses_data", table.as_str());
        vars.insert("question", question);
        render_prompt(&self.prompts, PromptId::AnalyzeExpenses, &vars)
    }

    pub async fn analyze(&self, expenses: &[Expense], question: &str) -> Result<String> {
        if expenses.is_empty() {
            return Ok(EMPTY_EXPENSES_MESSAGE.to_string());
        }

        let prompt = self.build_prompt(expenses, question)?;
        let response = self.llm.complete(&prompt).await?;
        debug!(rows = expenses.len(), "Analysis response: {}", response);
        Ok(response)
    }
}

/// Suggests ways to save from income and both expense tables
pub struct SavingsAgent<C> {
    llm: C,
    prompts: Arc<RwLock<PromptLibrary>>,
}

impl<C: Completer> SavingsAgent<C> {
    pub fn new(llm: C) -> Self {
        Self::with_prompts(llm, Arc::new(RwLock::new(PromptLibrary::new())))
    }

    pub fn with_prompts(llm: C, prompts: Arc<RwLock<PromptLibrary>>) -> Self {
        Self { llm, prompts }
    }

    /// The exact prompt `suggest` would send
    pub fn build_prompt(
        &self,
        income: f64,
        recurring: &[Expense],
        discretionary: &[Expense],
    ) -> Result<String> {
        let income = format!("{:.2}", income);
        let monthly = render_table(recurring);
        let current = render_table(discretionary);

        let mut vars = HashMap::new();
        vars.insert("income", income.as_str());
        vars.insert("monthly_expenses", monthly.as_str());
        vars.insert("current_expenses", current.as_str());
        render_prompt(&self.prompts, PromptId::SuggestSavings, &vars)
    }

    pub async fn suggest(
        &self,
        income: f64,
        recurring: &[Expense],
        discretionary: &[Expense],
    ) -> Result<String> {
        if discretionary.is_empty() {
            return Ok(EMPTY_DISCRETIONARY_MESSAGE.to_string());
        }

        let prompt = self.build_prompt(income, recurring, discretionary)?;
        let response = self.llm.complete(&prompt).await?;
        debug!(
            recurring = recurring.len(),
            discretionary = discretionary.len(),
            "Savings response: {}",
            response
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockBackend;

    fn expense(name: &str, amount: f64) -> Expense {
        Expense::new(name, amount).unwrap()
    }

    fn embedded() -> Arc<RwLock<PromptLibrary>> {
        Arc::new(RwLock::new(PromptLibrary::embedded_only()))
    }

    #[test]
    fn test_render_table_alignment() {
        let table = render_table(&[expense("Rent", 1000.0), expense("Coffee", 4.5)]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "  name   amount");
        assert_eq!(lines[1], "  Rent  1000.00");
        assert_eq!(lines[2], "Coffee     4.50");
    }

    #[test]
    fn test_render_table_empty_has_header_only() {
        assert_eq!(render_table(&[]), "name  amount");
    }

    #[tokio::test]
    async fn test_analyze_empty_skips_llm() {
        let llm = MockBackend::new();
        let agent = AnalysisAgent::with_prompts(llm.clone(), embedded());

        let reply = agent.analyze(&[], "anything").await.unwrap();
        assert_eq!(reply, EMPTY_EXPENSES_MESSAGE);
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_analyze_sends_one_prompt_with_each_row() {
        let llm = MockBackend::with_reply("You spent most on groceries.");
        let agent = AnalysisAgent::with_prompts(llm.clone(), embedded());
        let expenses = [expense("Groceries", 82.4), expense("Cinema", 12.0)];

        let reply = agent
            .analyze(&expenses, "Where does my money go?")
            .await
            .unwrap();
        assert_eq!(reply, "You spent most on groceries.");

        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 1);
        let prompt = &prompts[0];
        assert!(prompt.contains("You are an expert financial analyst."));
        assert!(prompt.contains("Question: Where does my money go?"));
        assert_eq!(prompt.matches("Groceries").count(), 1);
        assert_eq!(prompt.matches("82.40").count(), 1);
        assert_eq!(prompt.matches("Cinema").count(), 1);
        assert_eq!(prompt.matches("12.00").count(), 1);
    }

    #[tokio::test]
    async fn test_analyze_surfaces_llm_failure() {
        let llm = MockBackend::failing("quota exceeded");
        let agent = AnalysisAgent::with_prompts(llm, embedded());

        let err = agent
            .analyze(&[expense("Coffee", 4.5)], "why?")
            .await
            .unwrap_err();
        assert!(err.is_collaborator_failure());
        assert!(error_reply(&err).starts_with("Sorry, I encountered an error: "));
        assert!(error_reply(&err).contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_suggest_without_discretionary_skips_llm() {
        let llm = MockBackend::new();
        let agent = SavingsAgent::with_prompts(llm.clone(), embedded());

        let reply = agent
            .suggest(50000.0, &[expense("Rent", 20000.0)], &[])
            .await
            .unwrap();
        assert_eq!(reply, EMPTY_DISCRETIONARY_MESSAGE);
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_suggest_prompt_contents() {
        let llm = MockBackend::with_reply("1. Brew coffee at home.");
        let agent = SavingsAgent::with_prompts(llm.clone(), embedded());

        let reply = agent
            .suggest(
                5000.0,
                &[expense("Rent", 1500.0)],
                &[expense("Coffee", 4.5), expense("Takeout", 30.0)],
            )
            .await
            .unwrap();
        assert_eq!(reply, "1. Brew coffee at home.");

        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 1);
        let prompt = &prompts[0];
        assert!(prompt.contains("Monthly Income: $5000.00"));
        assert!(prompt.contains("Rent  1500.00"));
        assert!(prompt.contains("Takeout"));
        assert!(prompt.contains("3-5 actionable"));
    }

    #[tokio::test]
    async fn test_suggest_with_no_recurring_still_calls_llm() {
        let llm = MockBackend::new();
        let agent = SavingsAgent::with_prompts(llm.clone(), embedded());

        agent
            .suggest(0.0, &[], &[expense("Coffee", 4.5)])
            .await
            .unwrap();
        assert_eq!(llm.call_count(), 1);
    }
}
