//! Logging initialization

use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing_subscriber::EnvFilter;

/// Initialize tracing with standard configuration (defaults to info level)
pub fn init_tracing() {
    init_tracing_with_level("info");
}

/// Initialize tracing with a specific log level
///
/// The level can be: error, warn, info, debug, trace
/// RUST_LOG environment variable can override the configured level
pub fn init_tracing_with_level(level: &str) {
    // Build filter: use RUST_LOG if set, otherwise use the provided level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            // Default filter for our crates at the specified level
            // sqlx=warn silences the verbose query logs at debug level
            EnvFilter::new(format!(
                "sqlx=warn,polymarket={level},btc_updown_bot={level},hypersockets={level},{level}",
                level = level
            ))
        });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)  // Show module path for context
        .with_thread_ids(false)
        .with_line_number(false)
        .init();
}

/// Append-only JSONL sink for `trades.jsonl` / `strategy.jsonl` / `oracle.jsonl`.
///
/// Each call to `append` opens the file in append mode, writes one
/// serialized record plus a trailing newline, and closes it again -
/// there's no contention to manage since every writer in this bot owns
/// its own record stream single-threaded.
pub struct JsonlWriter {
    path: PathBuf,
}

impl JsonlWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn append<T: Serialize>(&self, record: &T) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut line = serde_json::to_string(record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Overwrites `performance.json` in full with the latest snapshot -
/// unlike the JSONL streams this one is replace-not-append, so callers
/// pass the full current state each time.
pub async fn write_performance_snapshot<T: Serialize>(
    path: impl AsRef<Path>,
    snapshot: &T,
) -> std::io::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let body = serde_json::to_string_pretty(snapshot)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    tokio::fs::write(path, body).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Rec {
        id: u32,
        note: String,
    }

    #[tokio::test]
    async fn append_writes_one_line_per_record() {
        let dir = std::env::temp_dir().join(format!("jsonl_test_{}", std::process::id()));
        let path = dir.join("trades.jsonl");
        let writer = JsonlWriter::new(&path);
        writer.append(&Rec { id: 1, note: "a".into() }).await.unwrap();
        writer.append(&Rec { id: 2, note: "b".into() }).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Rec = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first, Rec { id: 1, note: "a".into() });

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn performance_snapshot_replaces_not_appends() {
        let dir = std::env::temp_dir().join(format!("perf_test_{}", std::process::id()));
        let path = dir.join("performance.json");
        write_performance_snapshot(&path, &Rec { id: 1, note: "first".into() })
            .await
            .unwrap();
        write_performance_snapshot(&path, &Rec { id: 2, note: "second".into() })
            .await
            .unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: Rec = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed, Rec { id: 2, note: "second".into() });

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
