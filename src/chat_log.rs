//! Append-only chat transcript.
//!
//! Every answered chat is offered to a [`ChatLogSink`]. Logging is best
//! effort: a failing or slow sink is reported as [`LogStatus::Failed`] and
//! a `warn!`, and never changes the reply the student sees.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use socratic_tutor_core::models::ConversationTurn;

use crate::config::ChatLogConfig;

#[derive(Debug, Clone, Serialize)]
pub struct ChatLogEntry {
    pub session_id: String,
    /// RFC 3339, UTC.
    pub timestamp: String,
    pub document_source: String,
    pub user_message: String,
    pub bot_response: String,
    pub chat_history: Vec<ConversationTurn>,
}

impl ChatLogEntry {
    /// A new entry stamped with a fresh session id and the current time.
    pub fn new(
        document_source: &str,
        user_message: &str,
        bot_response: &str,
        chat_history: &[ConversationTurn],
    ) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            document_source: document_source.to_string(),
            user_message: user_message.to_string(),
            bot_response: bot_response.to_string(),
            chat_history: chat_history.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum LogStatus {
    Logged,
    /// The sink is disabled.
    Skipped,
    Failed(String),
}

#[async_trait]
pub trait ChatLogSink: Send + Sync {
    fn name(&self) -> &str;

    fn enabled(&self) -> bool {
        true
    }

    async fn append(&self, entry: &ChatLogEntry) -> Result<()>;
}

/// Append `entry`, bounded by `timeout`. Never fails.
pub async fn record(sink: &dyn ChatLogSink, entry: &ChatLogEntry, timeout: Duration) -> LogStatus {
    if !sink.enabled() {
        return LogStatus::Skipped;
    }
    let reason = match tokio::time::timeout(timeout, sink.append(entry)).await {
        Ok(Ok(())) => return LogStatus::Logged,
        Ok(Err(e)) => format!("{:#}", e),
        Err(_) => format!("timed out after {}ms", timeout.as_millis()),
    };
    warn!(sink = sink.name(), session_id = %entry.session_id, error = %reason, "chat log append failed");
    LogStatus::Failed(reason)
}

/// Record `entry` on a background task so the caller never waits on the
/// sink. The status is logged from the task and returned through the handle.
pub fn spawn_record(
    sink: Arc<dyn ChatLogSink>,
    entry: ChatLogEntry,
    timeout: Duration,
) -> JoinHandle<LogStatus> {
    tokio::spawn(async move {
        let status = record(sink.as_ref(), &entry, timeout).await;
        debug!(sink = sink.name(), session_id = %entry.session_id, status = ?status, "chat log");
        status
    })
}

pub struct SqliteChatLog {
    pool: SqlitePool,
}

impl SqliteChatLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatLogSink for SqliteChatLog {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn append(&self, entry: &ChatLogEntry) -> Result<()> {
        let history_json = serde_json::to_string(&entry.chat_history)?;
        sqlx::query(
            r#"
            INSERT INTO chat_logs (session_id, timestamp, document_source,
                                   user_message, bot_response, history_json)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.session_id)
        .bind(&entry.timestamp)
        .bind(&entry.document_source)
        .bind(&entry.user_message)
        .bind(&entry.bot_response)
        .bind(history_json)
        .execute(&self.pool)
        .await
        .context("Failed to insert chat log row")?;
        Ok(())
    }
}

/// One JSON object per line.
pub struct JsonlChatLog {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlChatLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }
}

#[async_trait]
impl ChatLogSink for JsonlChatLog {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn append(&self, entry: &ChatLogEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open chat log: {}", self.path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

pub struct DisabledChatLog;

#[async_trait]
impl ChatLogSink for DisabledChatLog {
    fn name(&self) -> &str {
        "disabled"
    }

    fn enabled(&self) -> bool {
        false
    }

    async fn append(&self, _entry: &ChatLogEntry) -> Result<()> {
        Ok(())
    }
}

pub fn create_sink(config: &ChatLogConfig, pool: &SqlitePool) -> Result<Arc<dyn ChatLogSink>> {
    match config.sink.as_str() {
        "sqlite" => Ok(Arc::new(SqliteChatLog::new(pool.clone()))),
        "jsonl" => Ok(Arc::new(JsonlChatLog::new(config.path.clone()))),
        "disabled" => Ok(Arc::new(DisabledChatLog)),
        other => anyhow::bail!("Unknown chat_log sink: {}", other),
    }
}
