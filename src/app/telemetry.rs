use crate::{snapshot::MetricsSnapshot, Error, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Appends published snapshots to a file, one JSON object per line.
pub struct SnapshotJournal {
    path: PathBuf,
}

impl SnapshotJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one snapshot. Returns the path used for visibility in tests.
    pub fn append(&self, snapshot: &MetricsSnapshot) -> Result<PathBuf> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let line = serde_json::to_string(snapshot)
            .map_err(|e| Error::Parse(format!("json: {e}")))?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(f, "{line}")?;
        Ok(self.path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tempfile::tempdir;

    #[test]
    fn journal_appends_json_lines() {
        let tmp = tempdir().unwrap();
        let journal = SnapshotJournal::new(tmp.path().join("nested/journal.jsonl"));
        let first = MetricsSnapshot {
            sequence: 1,
            resident_bytes: 8192,
            ..Default::default()
        };
        let second = MetricsSnapshot {
            sequence: 2,
            ..first
        };
        journal.append(&first).unwrap();
        let path = journal.append(&second).unwrap();

        let contents = fs::read_to_string(path).unwrap();
        let lines: Vec<Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["sequence"], 1);
        assert_eq!(lines[1]["sequence"], 2);
        assert_eq!(lines[1]["resident_bytes"], 8192);
    }
}
