use crate::job::work::WorkItem;
use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

const PENDING_FILE: &str = "pending.jsonl";
const JOURNAL_FILE: &str = "journal.jsonl";

/// One on-disk queue node: a directory holding the pending spill file
/// (written on shutdown, consumed on the next open) and an append-only
/// journal used for backup copies.
pub(crate) struct NodeStore {
    dir: PathBuf,
}

impl NodeStore {
    pub(crate) fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create queue node dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// Loads and removes the pending spill left by a previous shutdown.
    pub(crate) fn take_pending(&self) -> Result<Vec<WorkItem>> {
        let path = self.dir.join(PENDING_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read pending spill {}", path.display()))?;
        let mut items = Vec::new();
        for line in contents.lines().filter(|line| !line.trim().is_empty()) {
            let item: WorkItem = serde_json::from_str(line)
                .with_context(|| format!("corrupt pending spill entry {line:?}"))?;
            items.push(item);
        }

        std::fs::remove_file(&path)
            .with_context(|| format!("failed to remove consumed spill {}", path.display()))?;
        Ok(items)
    }

    /// Overwrites the pending spill with the queue's remaining items.
    pub(crate) fn flush_pending(&self, items: &[WorkItem]) -> Result<()> {
        let path = self.dir.join(PENDING_FILE);
        let mut buffer = String::new();
        for item in items {
            buffer.push_str(&serde_json::to_string(item).context("failed to encode work item")?);
            buffer.push('\n');
        }
        std::fs::write(&path, buffer)
            .with_context(|| format!("failed to write pending spill {}", path.display()))
    }

    /// Appends one admitted item to the backup journal.
    pub(crate) fn append(&self, item: &WorkItem) -> Result<()> {
        let path = self.dir.join(JOURNAL_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open backup journal {}", path.display()))?;
        let line = serde_json::to_string(item).context("failed to encode work item")?;
        writeln!(file, "{line}")
            .with_context(|| format!("failed to append to backup journal {}", path.display()))
    }
}
