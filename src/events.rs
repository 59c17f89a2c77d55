//! Append-only JSONL log of match queries.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    Image,
    Text,
}

/// A single query and its best match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryEvent {
    #[serde(rename = "type")]
    pub kind: QueryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub top1_id: Value,
    pub score: f32,
    /// Milliseconds since the unix epoch
    pub ts: i64,
}

impl QueryEvent {
    /// Create an event stamped with the current time.
    pub fn new(kind: QueryKind, top1_id: Value, score: f32) -> Self {
        Self {
            kind,
            filename: None,
            text: None,
            top1_id,
            score,
            ts: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Writes one JSON object per line. Appends are serialized by a mutex.
pub struct EventLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl EventLog {
    /// Open (or create) the log file in append mode.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, event: &QueryEvent) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let mut file = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("event log lock poisoned: {e}")))?;

        // single write per event keeps lines intact
        file.write_all(&line)?;
        file.flush()
    }
}
