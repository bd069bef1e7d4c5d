//! Destinations for conversation records

use crate::types::ConversationRecord;
use async_trait::async_trait;
use lemo_common::{LemoError, Result};
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Persists one record per answered request
#[async_trait]
pub trait ConversationSink: Send + Sync {
    async fn record(&self, record: &ConversationRecord) -> Result<()>;
}

/// Discards every record
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopConversationSink;

#[async_trait]
impl ConversationSink for NoopConversationSink {
    async fn record(&self, _record: &ConversationRecord) -> Result<()> {
        Ok(())
    }
}

/// Appends records to a file as JSON lines
pub struct JsonlConversationSink {
    path: PathBuf,
    // serialises appends so concurrent requests never interleave lines
    write_lock: Mutex<()>,
}

impl JsonlConversationSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConversationSink for JsonlConversationSink {
    async fn record(&self, record: &ConversationRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                LemoError::Storage(format!("Failed to open conversation log {:?}: {}", self.path, e))
            })?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!("Recorded conversation for session {}", record.session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(session_id: &str, answer: &str) -> ConversationRecord {
        ConversationRecord {
            session_id: session_id.to_string(),
            user_id: Some("u1".to_string()),
            user_message: "如何退货？".to_string(),
            bot_answer: answer.to_string(),
            intent: Some("售后服务".to_string()),
            confidence: 0.8,
            linked_knowledge_id: Some(1),
            latency_ms: 42,
            timestamp: 1_700_000_000_000,
        }
    }

    #[tokio::test]
    async fn test_jsonl_sink_appends_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("conversations.jsonl");
        let sink = JsonlConversationSink::new(&path);

        sink.record(&record("s1", "七天无理由退货")).await.unwrap();
        sink.record(&record("s2", "请联系客服")).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: ConversationRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first, record("s1", "七天无理由退货"));
        let second: ConversationRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.session_id, "s2");
    }

    #[tokio::test]
    async fn test_jsonl_sink_reports_unwritable_path() {
        let dir = TempDir::new().unwrap();
        // a directory cannot be opened for appending
        let sink = JsonlConversationSink::new(dir.path());
        assert!(sink.record(&record("s1", "a")).await.is_err());
    }

    #[tokio::test]
    async fn test_noop_sink() {
        assert!(NoopConversationSink.record(&record("s1", "a")).await.is_ok());
    }
}
