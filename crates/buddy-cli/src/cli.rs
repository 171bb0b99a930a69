//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Budget Buddy - Track expenses and get savings advice
#[derive(Parser)]
#[command(name = "buddy")]
#[command(about = "Personal finance assistant with LLM-backed advice", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Expense store backend: sqlite or rest (defaults to BUDDY_STORE, then sqlite)
    #[arg(long, global = true)]
    pub store: Option<String>,

    /// Database path (sqlite backend)
    #[arg(long, default_value = "buddy.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended)
    ///
    /// By default, the local database is encrypted using SQLCipher.
    /// Set BUDDY_DB_KEY environment variable with your passphrase.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the expense tables (or check the hosted store)
    Init,

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Disable authentication (for local development only)
        ///
        /// WARNING: Do not use this flag when exposing the server to a network.
        /// By default, requests need a BUDDY_API_KEYS bearer key or must come
        /// from BUDDY_TRUSTED_NETWORKS.
        #[arg(long)]
        no_auth: bool,
    },

    /// Show or change expenses
    Expenses {
        #[command(subcommand)]
        action: ExpensesAction,
    },

    /// Ask the assistant a question about your spending
    Ask {
        /// Monthly income (used for savings advice)
        #[arg(long, allow_hyphen_values = true)]
        income: Option<f64>,

        /// The question
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },

    /// Manage LLM prompts
    Prompts {
        #[command(subcommand)]
        action: Option<PromptsAction>,
    },

    /// Show store, encryption and LLM status
    Status,
}

#[derive(Subcommand)]
pub enum ExpensesAction {
    /// Show recurring monthly expenses, or replace them
    Recurring {
        #[command(subcommand)]
        action: Option<RecurringAction>,
    },

    /// List recurring and discretionary expenses
    List,

    /// Add a discretionary expense, or update one by id
    Add {
        /// Expense name
        #[arg(long)]
        name: String,

        /// Amount spent
        #[arg(long, allow_hyphen_values = true)]
        amount: f64,

        /// Existing row to update instead of adding
        #[arg(long)]
        id: Option<i64>,
    },
}

#[derive(Subcommand)]
pub enum RecurringAction {
    /// Replace all recurring expenses (e.g. `set Rent=1200 Phone=30`)
    Set {
        /// NAME=AMOUNT pairs
        #[arg(required = true, num_args = 1..)]
        entries: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum PromptsAction {
    /// List all prompts and their override status
    List,

    /// Show a prompt's content
    Show {
        /// Prompt ID (e.g. analyze_expenses)
        id: String,
    },

    /// Print the override directory
    Path,
}
