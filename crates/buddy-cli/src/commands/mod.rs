//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Shared utilities (open_store) and `init`
//! - `expenses` - Recurring and discretionary expense commands
//! - `ask` - One-shot chat with the advisory agents
//! - `prompts` - Prompt library management commands
//! - `serve` - Web server command
//! - `status` - Store, encryption and LLM status

pub mod ask;
pub mod core;
pub mod expenses;
pub mod prompts;
pub mod serve;
pub mod status;

// Re-export command functions for main.rs
pub use ask::*;
pub use core::*;
pub use expenses::*;
pub use prompts::*;
pub use serve::*;
pub use status::*;
