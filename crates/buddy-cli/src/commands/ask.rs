//! One-shot chat command

use anyhow::{bail, Result};
use buddy_core::{
    Advisor, AgentKind, ChatSession, ChatTurn, Completer, ExpenseStore,
    LLM_NOT_CONFIGURED_MESSAGE,
};

/// Answer one message through the advisory agents
///
/// Store and LLM failures are printed as the reply (and returned with
/// `failed` set) rather than aborting the command.
pub async fn cmd_ask<S, C>(
    store: S,
    llm: Option<C>,
    income: Option<f64>,
    message: &str,
) -> Result<ChatTurn>
where
    S: ExpenseStore,
    C: Completer + Clone,
{
    let message = message.trim();
    if message.is_empty() {
        bail!("Please type a question");
    }

    let mut session = match income {
        Some(income) => ChatSession::with_income(income)?,
        None => ChatSession::new(),
    };

    let turn = match llm {
        Some(llm) => {
            println!("🤖 Asking {} ({})...", llm.model(), llm.host());
            Advisor::new(store, llm).reply(&mut session, message).await
        }
        None => ChatTurn {
            agent: AgentKind::for_message(message),
            reply: LLM_NOT_CONFIGURED_MESSAGE.to_string(),
            failed: true,
        },
    };

    println!();
    if turn.failed {
        println!("⚠️  {}", turn.reply);
    } else {
        println!("💬 [{}] {}", turn.agent.as_str(), turn.reply);
    }
    println!();

    Ok(turn)
}
