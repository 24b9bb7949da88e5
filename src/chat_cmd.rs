//! `tutor chat`: one question, one answer, from the command line.

use anyhow::{bail, Context, Result};

use socratic_tutor_core::models::ConversationTurn;
use socratic_tutor_core::responder::ReplyOutcome;

use crate::chat_log::{self, ChatLogEntry};
use crate::config::Config;
use crate::server::{normalize_history, HistoryEntry};
use crate::services::Services;

/// `history_json` uses the same shapes as the HTTP `/chat` history field.
pub fn parse_history(history_json: Option<&str>) -> Result<Vec<ConversationTurn>> {
    match history_json {
        Some(raw) => {
            let entries: Vec<HistoryEntry> =
                serde_json::from_str(raw).context("--history must be a JSON array of turns")?;
            Ok(normalize_history(entries).context("--history")?)
        }
        None => Ok(Vec::new()),
    }
}

pub async fn run_chat(
    config: &Config,
    message: &str,
    document: &str,
    history_json: Option<&str>,
) -> Result<()> {
    let message = message.trim();
    let document = document.trim();
    if message.is_empty() {
        bail!("message must not be empty");
    }
    if document.is_empty() {
        bail!("--document must not be empty");
    }
    let history = parse_history(history_json)?;

    let services = Services::open(config).await?;
    let reply = services.responder.respond(message, &history, document).await;

    let entry = ChatLogEntry::new(document, message, &reply.text, &history);
    chat_log::record(services.chat_log.as_ref(), &entry, services.chat_log_timeout).await;

    println!("{}", reply.text);
    match &reply.outcome {
        ReplyOutcome::Answered => {}
        ReplyOutcome::NoContext => eprintln!("(no matching passages in {})", document),
        ReplyOutcome::RetrievalDegraded(reason) => eprintln!("(retrieval failed: {})", reason),
        ReplyOutcome::Fallback(reason) => eprintln!("(generation failed: {})", reason),
    }

    services.close().await;
    Ok(())
}
