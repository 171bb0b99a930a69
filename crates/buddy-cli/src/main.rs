//! Budget Buddy CLI - Personal finance assistant
//!
//! Usage:
//!   buddy init                                  Create the expense tables
//!   buddy expenses recurring set Rent=1200      Replace recurring expenses
//!   buddy expenses add --name Coffee --amount 4 Log a discretionary expense
//!   buddy ask --income 3000 "How can I save?"   Ask the advisory agents
//!   buddy serve --port 3000                     Start web server

mod cli;
mod commands;


use anyhow::Result;
use buddy_core::{LlmClient, PromptLibrary};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let store_arg = cli.store.as_deref();

    match cli.command {
        Commands::Init => {
            let store = commands::open_store(&cli.db, store_arg, cli.no_encrypt)?;
            commands::cmd_init(&store, cli.no_encrypt).await
        }
        Commands::Serve {
            port,
            host,
            no_auth,
        } => commands::cmd_serve(&cli.db, store_arg, &host, port, no_auth, cli.no_encrypt).await,
        Commands::Expenses { action } => {
            let store = commands::open_store(&cli.db, store_arg, cli.no_encrypt)?;
            match action {
                ExpensesAction::Recurring { action: None } => {
                    commands::cmd_recurring_show(&store).await
                }
                ExpensesAction::Recurring {
                    action: Some(RecurringAction::Set { entries }),
                } => commands::cmd_recurring_set(&store, &entries).await,
                ExpensesAction::List => commands::cmd_expenses_list(&store).await,
                ExpensesAction::Add { name, amount, id } => {
                    commands::cmd_expenses_add(&store, &name, amount, id).await
                }
            }
        }
        Commands::Ask { income, message } => {
            let store = commands::open_store(&cli.db, store_arg, cli.no_encrypt)?;
            commands::cmd_ask(store, LlmClient::from_env(), income, &message.join(" "))
                .await
                .map(|_| ())
        }
        Commands::Prompts { action } => {
            let mut library = PromptLibrary::new();
            match action {
                None | Some(PromptsAction::List) => commands::cmd_prompts_list(&mut library),
                Some(PromptsAction::Show { id }) => commands::cmd_prompts_show(&mut library, &id),
                Some(PromptsAction::Path) => commands::cmd_prompts_path(),
            }
        }
        Commands::Status => commands::cmd_status(&cli.db, store_arg, cli.no_encrypt).await,
    }
}
