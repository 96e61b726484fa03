//! Durable, append-only event log.
//!
//! The file is truncated once when the log is opened and then only ever
//! appended to. Every [`EventLog::record`] call is flushed to storage before
//! it returns. Failures are reported on the diagnostic channel (`tracing`,
//! which the binary routes to stderr) and never propagate to the caller.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{SecondsFormat, Utc};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::types::McpError;

pub struct EventLog {
    path: Option<PathBuf>,
    // tokio's mutex is fair, so writes land in call order.
    file: Mutex<Option<File>>,
    warned: AtomicBool,
}

impl EventLog {
    /// Create (or truncate) the log file at `path`, creating parent
    /// directories as needed.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, McpError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(McpError::Logging)?;
        }
        let file = File::create(path).await.map_err(McpError::Logging)?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            file: Mutex::new(Some(file)),
            warned: AtomicBool::new(false),
        })
    }

    /// Like [`create`](Self::create), but falls back to a disabled log when
    /// the file cannot be opened.
    pub async fn create_or_disabled(path: impl AsRef<Path>) -> Self {
        match Self::create(path.as_ref()).await {
            Ok(log) => log,
            Err(e) => {
                tracing::warn!(path = %path.as_ref().display(), error = %e, "event log disabled");
                Self::disabled()
            }
        }
    }

    /// A log that records nothing.
    pub fn disabled() -> Self {
        Self {
            path: None,
            file: Mutex::new(None),
            warned: AtomicBool::new(true),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append a timestamped line and flush it to storage.
    pub async fn record(&self, message: impl AsRef<str>) {
        let line = format_line(message.as_ref());
        let mut guard = self.file.lock().await;
        let Some(file) = guard.as_mut() else {
            return;
        };
        if let Err(e) = write_durably(file, line.as_bytes()).await {
            // One warning per log; a full disk would otherwise flood stderr.
            if !self.warned.swap(true, Ordering::Relaxed) {
                let err = McpError::Logging(e);
                tracing::warn!(error = %err, "event log write failed");
            }
        }
    }
}

async fn write_durably(file: &mut File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_data().await
}

fn format_line(message: &str) -> String {
    let ts = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    // Keep one event per line.
    let message = message.replace('\n', "\\n");
    format!("[{}] {}\n", ts, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_truncates_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.log");
        std::fs::write(&path, "stale contents from a previous run\n").unwrap();

        let log = EventLog::create(&path).await.unwrap();
        assert_eq!(log.path(), Some(path.as_path()));
        log.record("started").await;

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("stale"));
        assert!(contents.ends_with("] started\n"));
    }

    #[tokio::test]
    async fn test_records_append_in_call_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("server.log");
        let log = EventLog::create(&path).await.unwrap();

        for i in 0..5 {
            log.record(format!("event {}", i)).await;
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 5);
        for (i, line) in lines.iter().enumerate() {
            assert!(line.starts_with('['));
            assert!(line.ends_with(&format!("] event {}", i)));
        }
    }

    #[tokio::test]
    async fn test_concurrent_records_never_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.log");
        let log = EventLog::create(&path).await.unwrap();

        let long = "x".repeat(4096);
        futures::future::join_all((0..8).map(|_| log.record(&long))).await;

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 8);
        assert!(contents.lines().all(|l| l.ends_with(&long)));
    }

    #[test]
    fn test_timestamp_format() {
        let line = format_line("multi\nline");
        let (ts, rest) = line.split_once("] ").unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&ts[1..]).is_ok());
        assert_eq!(rest, "multi\\nline\n");
    }

    #[tokio::test]
    async fn test_unopenable_path_degrades_to_disabled() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as the log file.
        let log = EventLog::create_or_disabled(dir.path()).await;
        assert!(log.path().is_none());
        log.record("dropped").await;
    }
}
