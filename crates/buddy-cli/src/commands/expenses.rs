//! Expense command implementations

use anyhow::{bail, Context, Result};
use buddy_core::{render_table, Expense, ExpenseRecord, ExpenseStore};

/// Parse a `NAME=AMOUNT` pair (the last `=` separates the amount)
pub fn parse_entry(entry: &str) -> Result<Expense> {
    let (name, amount) = entry
        .rsplit_once('=')
        .with_context(|| format!("Expected NAME=AMOUNT, got '{}'", entry))?;
    let amount: f64 = amount
        .trim()
        .parse()
        .with_context(|| format!("Invalid amount in '{}'", entry))?;

    Ok(Expense {
        name: name.trim().to_string(),
        amount,
    })
}

fn to_expenses(records: Vec<ExpenseRecord>) -> Vec<Expense> {
    records.into_iter().map(Expense::from).collect()
}

fn print_section(title: &str, expenses: &[Expense]) {
    println!("{}", title);
    if expenses.is_empty() {
        println!("   (none)");
        return;
    }
    for line in render_table(expenses).lines() {
        println!("   {}", line);
    }
    let total: f64 = expenses.iter().map(|e| e.amount).sum();
    println!("   Total: {:.2}", total);
}

pub async fn cmd_recurring_show<S: ExpenseStore>(store: &S) -> Result<()> {
    let recurring = to_expenses(store.list_recurring_expenses().await?);
    println!();
    print_section("📅 Recurring monthly expenses", &recurring);
    println!();
    Ok(())
}

/// Replace every recurring expense with `entries`
///
/// Blank entries (no name or a zero amount) are skipped; at least one must remain.
pub async fn cmd_recurring_set<S: ExpenseStore>(store: &S, entries: &[String]) -> Result<()> {
    let parsed = entries
        .iter()
        .map(|e| parse_entry(e))
        .collect::<Result<Vec<_>>>()?;

    let (expenses, blank): (Vec<Expense>, Vec<Expense>) =
        parsed.into_iter().partition(|e| !e.is_blank());
    for e in &blank {
        println!("   Skipping blank entry '{}={}'", e.name, e.amount);
    }
    if expenses.is_empty() {
        bail!("Please enter at least one valid expense");
    }
    for e in &expenses {
        e.validate()?;
    }

    store
        .replace_recurring_expenses(&expenses)
        .await
        .context("Failed to save recurring expenses")?;

    println!("✅ Saved {} recurring expense(s)", expenses.len());
    Ok(())
}

pub async fn cmd_expenses_list<S: ExpenseStore>(store: &S) -> Result<()> {
    let recurring = to_expenses(store.list_recurring_expenses().await?);
    let records = store.list_discretionary_expenses().await?;

    println!();
    print_section("📅 Recurring monthly expenses", &recurring);
    println!();
    println!("🛒 Discretionary expenses");
    if records.is_empty() {
        println!("   (none)");
    } else {
        println!("   {:>5}  {:<24} {:>10}  {}", "ID", "NAME", "AMOUNT", "ADDED");
        println!("   {}", "-".repeat(60));
        for r in &records {
            println!(
                "   {:>5}  {:<24} {:>10.2}  {}",
                r.id.map(|id| id.to_string()).unwrap_or_default(),
                r.name,
                r.amount,
                r.created_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default()
            );
        }
        let total: f64 = records.iter().map(|r| r.amount).sum();
        println!("   Total: {:.2}", total);
    }
    println!();
    Ok(())
}

/// Add a discretionary expense, or update row `id`
pub async fn cmd_expenses_add<S: ExpenseStore>(
    store: &S,
    name: &str,
    amount: f64,
    id: Option<i64>,
) -> Result<()> {
    let expense = Expense::new(name, amount)?;
    let record = store
        .add_or_update_discretionary_expense(&expense.name, expense.amount, id)
        .await?;

    let verb = if id.is_some() { "Updated" } else { "Added" };
    println!(
        "✅ {} '{}' ({:.2}) as #{}",
        verb,
        record.name,
        record.amount,
        record.id.map(|id| id.to_string()).unwrap_or_else(|| "?".into())
    );
    Ok(())
}
