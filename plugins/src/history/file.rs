use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use opsbot_core::api::{HistoryLogger, HistoryProvider};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;

/// Keeps run output as `<root>/<task>/run-<index>.log`.
pub struct FileHistoryProvider {
    root: PathBuf,
}

impl FileHistoryProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn log_path(&self, tag: &str, index: u64) -> PathBuf {
        self.root.join(tag).join(format!("run-{index}.log"))
    }
}

fn parse_index(name: &str) -> Option<u64> {
    name.strip_prefix("run-")?.strip_suffix(".log")?.parse().ok()
}

/// Removes logs whose index falls out of the newest `keep` ending at `index`.
async fn evict(dir: &Path, index: u64, keep: usize) -> Result<()> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(old) = name.to_str().and_then(parse_index) else {
            continue;
        };
        if old + (keep as u64) <= index {
            tracing::debug!(path = %entry.path().display(), "removing old history");
            if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                tracing::warn!(path = %entry.path().display(), reason = %e, "failed to remove old history");
            }
        }
    }
    Ok(())
}

#[async_trait]
impl HistoryProvider for FileHistoryProvider {
    async fn new_history(
        &self,
        tag: &str,
        index: u64,
        max_histories: usize,
    ) -> Result<Arc<dyn HistoryLogger>> {
        let dir = self.root.join(tag);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating history dir {}", dir.display()))?;
        evict(&dir, index, max_histories.max(1)).await?;

        let path = self.log_path(tag, index);
        let file = tokio::fs::File::create(&path)
            .await
            .with_context(|| format!("creating history file {}", path.display()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(path, BufWriter::new(file), rx));
        Ok(Arc::new(FileHistoryLogger { tx }))
    }
}

enum Record {
    Line(String),
    Close,
}

struct FileHistoryLogger {
    tx: mpsc::UnboundedSender<Record>,
}

impl HistoryLogger for FileHistoryLogger {
    fn log(&self, line: &str) {
        let _ = self.tx.send(Record::Line(line.to_string()));
    }

    fn section(&self, name: &str, info: &str) {
        let _ = self.tx.send(Record::Line(format!("*** {name} - {info}")));
    }

    fn close(&self) {
        let _ = self.tx.send(Record::Close);
    }
}

async fn write_loop(
    path: PathBuf,
    mut out: BufWriter<tokio::fs::File>,
    mut rx: mpsc::UnboundedReceiver<Record>,
) {
    while let Some(rec) = rx.recv().await {
        let line = match rec {
            Record::Line(line) => line,
            Record::Close => break,
        };
        let stamped = format!("{} {}\n", chrono::Local::now().format("%Y/%m/%d %H:%M:%S"), line);
        if let Err(e) = out.write_all(stamped.as_bytes()).await {
            tracing::error!(error.kind = "history", path = %path.display(), reason = %e, "history write failed");
            return;
        }
    }
    if let Err(e) = out.flush().await {
        tracing::error!(error.kind = "history", path = %path.display(), reason = %e, "history flush failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn read_when_closed(path: &Path, marker: &str) -> String {
        for _ in 0..200 {
            if let Ok(text) = tokio::fs::read_to_string(path).await {
                if text.contains(marker) {
                    return text;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("history never flushed to {}", path.display());
    }

    #[tokio::test]
    async fn writes_sections_and_lines_then_flushes_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileHistoryProvider::new(dir.path());
        let logger = provider.new_history("deploy", 0, 3).await.unwrap();
        logger.section("deploy", "Starting task");
        logger.log("OUT hello");
        logger.section("done", "pipeline has completed");
        logger.close();

        let text = read_when_closed(&provider.log_path("deploy", 0), "pipeline has completed").await;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("*** deploy - Starting task"));
        assert!(lines[1].ends_with("OUT hello"));
    }

    #[tokio::test]
    async fn keeps_only_the_newest_logs() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileHistoryProvider::new(dir.path());
        for i in 0..5 {
            provider.new_history("nightly", i, 2).await.unwrap().close();
        }
        let mut left: Vec<u64> = std::fs::read_dir(dir.path().join("nightly"))
            .unwrap()
            .filter_map(|e| parse_index(e.unwrap().file_name().to_str().unwrap()))
            .collect();
        left.sort();
        assert_eq!(left, vec![3, 4]);
    }
}
