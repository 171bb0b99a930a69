//! Server command implementation

use std::path::Path;

use anyhow::Result;
use buddy_server::ServerConfig;

use super::open_store;

pub async fn cmd_serve(
    db_path: &Path,
    store_arg: Option<&str>,
    host: &str,
    port: u16,
    no_auth: bool,
    no_encrypt: bool,
) -> Result<()> {
    let store = open_store(db_path, store_arg, no_encrypt)?;
    let config = ServerConfig::from_env(!no_auth);

    println!("🚀 Starting Budget Buddy web server...");
    println!("   Store: {}", buddy_core::ExpenseStore::name(&store));
    println!("   Listening: http://{}:{}", host, port);

    if no_auth {
        println!();
        println!("   ⚠️  Authentication DISABLED - do not expose to network!");
    } else {
        if !config.api_keys.is_empty() {
            println!(
                "   🔑 API keys: {} configured (BUDDY_API_KEYS)",
                config.api_keys.len()
            );
        }
        if !config.trusted_networks.is_empty() {
            println!(
                "   🏠 Trusted networks: {} (BUDDY_TRUSTED_NETWORKS)",
                join(&config.trusted_networks)
            );
        }
        if !config.trusted_proxies.is_empty() {
            println!(
                "   🔀 Trusted proxies: {} (BUDDY_TRUSTED_PROXIES)",
                join(&config.trusted_proxies)
            );
        }
        if config.api_keys.is_empty() && config.trusted_networks.is_empty() {
            println!("   🔒 Authentication required, but no BUDDY_API_KEYS or BUDDY_TRUSTED_NETWORKS set");
            println!("      Every request will be rejected; use --no-auth for local development");
        }
    }
    if no_encrypt {
        println!("   ⚠️  Encryption DISABLED (--no-encrypt)");
    }
    println!();
    println!("   Press Ctrl+C to stop");

    buddy_server::serve_with_config(store, host, port, config).await
}

fn join(nets: &[impl ToString]) -> String {
    nets.iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
