//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_store` - Shared utility to open the expense store
//! - `cmd_init` - Create tables / check the hosted store

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use buddy_core::{ExpenseStore, StoreBackend, StoreClient};
use tracing::debug;

/// Pick the backend from `--store`, falling back to `BUDDY_STORE`
pub fn resolve_backend(store_arg: Option<&str>) -> Result<StoreBackend> {
    match store_arg {
        Some(name) => name
            .parse()
            .map_err(|e: String| anyhow!("{} (expected sqlite or rest)", e)),
        None => Ok(StoreBackend::from_env()),
    }
}

/// Open the expense store, encrypted by default for the sqlite backend
pub fn open_store(db_path: &Path, store_arg: Option<&str>, no_encrypt: bool) -> Result<StoreClient> {
    let backend = resolve_backend(store_arg)?;
    let path_str = db_path
        .to_str()
        .context("Database path must be valid UTF-8")?;
    debug!(backend = backend.as_str(), path = path_str, "Opening expense store");

    let context = match (backend, no_encrypt) {
        (StoreBackend::Sqlite, true) => "Failed to open database (unencrypted)",
        (StoreBackend::Sqlite, false) => "Failed to open database",
        (StoreBackend::Rest, _) => "Failed to configure hosted store",
    };
    StoreClient::open(backend, path_str, no_encrypt).context(context)
}

pub async fn cmd_init<S: ExpenseStore>(store: &S, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing expense store {}...", store.name());

    if !store.health_check().await {
        bail!("Expense store {} is not responding", store.name());
    }
    println!("   Tables ready: monthly_expenses, current_expenses");

    if store.name().starts_with("sqlite:") {
        if no_encrypt {
            println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
        } else {
            println!("   🔒 Encryption: ENABLED");
        }
    }

    println!("✅ Expense store initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Set your monthly costs: buddy expenses recurring set Rent=1200 Phone=30");
    println!("  2. Log spending: buddy expenses add --name Coffee --amount 4.50");
    println!("  3. Ask for advice: buddy ask --income 3000 \"How can I save more?\"");

    Ok(())
}
