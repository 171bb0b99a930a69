//! Status command implementation

use std::path::Path;

use anyhow::Result;
use buddy_core::config::default_config_path;
use buddy_core::store::DB_KEY_ENV;
use buddy_core::{Completer, ExpenseStore, LlmClient, StoreBackend};

use super::{open_store, resolve_backend};

pub async fn cmd_status(db_path: &Path, store_arg: Option<&str>, no_encrypt: bool) -> Result<()> {
    let backend = resolve_backend(store_arg)?;

    println!();
    println!("📊 Budget Buddy Status");
    println!("   ─────────────────────────────────────────────────────────────");
    println!("   Store backend: {}", backend.as_str());

    let has_key = std::env::var(DB_KEY_ENV).is_ok();
    let should_open = match backend {
        StoreBackend::Sqlite => {
            println!("   Database: {}", db_path.display());
            if let Ok(metadata) = std::fs::metadata(db_path) {
                let size_kb = metadata.len() as f64 / 1024.0;
                if size_kb < 1024.0 {
                    println!("   Size: {:.1} KB", size_kb);
                } else {
                    println!("   Size: {:.1} MB", size_kb / 1024.0);
                }
            } else {
                println!("   Size: (database not initialized, run 'buddy init')");
            }

            if no_encrypt {
                println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
            } else if has_key {
                println!("   🔒 Encryption: ENABLED ({}=***)", DB_KEY_ENV);
            } else {
                println!("   ❌ Encryption: REQUIRED but {} not set", DB_KEY_ENV);
            }
            db_path.exists()
        }
        StoreBackend::Rest => true,
    };

    if should_open {
        match open_store(db_path, store_arg, no_encrypt) {
            Ok(store) => {
                let healthy = store.health_check().await;
                println!(
                    "   {} Store: {}",
                    if healthy { "✅" } else { "❌" },
                    store.name()
                );
                if healthy {
                    if let (Ok(recurring), Ok(current)) = (
                        store.list_recurring_expenses().await,
                        store.list_discretionary_expenses().await,
                    ) {
                        println!("   Recurring expenses: {}", recurring.len());
                        println!("   Discretionary expenses: {}", current.len());
                    }
                }
            }
            Err(e) => {
                println!("   ❌ Error opening store: {:#}", e);
                if backend == StoreBackend::Sqlite && !no_encrypt && !has_key {
                    println!("      Set {} or use --no-encrypt", DB_KEY_ENV);
                } else if backend == StoreBackend::Sqlite && has_key {
                    println!("      (Check if {} is correct)", DB_KEY_ENV);
                }
            }
        }
    }

    println!();
    match LlmClient::from_env() {
        Some(client) => {
            let healthy = client.health_check().await;
            println!(
                "   {} LLM: {} at {} (model: {})",
                if healthy { "✅" } else { "⚠️ " },
                client.backend_name(),
                client.host(),
                client.model()
            );
        }
        None => {
            println!("   ℹ️  LLM: not configured (set GEMINI_API_KEY, or LLM_BACKEND=ollama|openai_compatible)");
        }
    }

    if let Some(path) = default_config_path() {
        let source = if path.exists() { "override" } else { "embedded defaults" };
        println!("   Network policy: {} ({})", path.display(), source);
    }

    println!();
    Ok(())
}
