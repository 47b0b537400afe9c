//! Append-only relevance feedback, one JSON object per line.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use ragdb_core::Result;

pub const FEEDBACK_FILE: &str = "feedback.jsonl";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub query_id: String,
    pub relevant: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

pub struct FeedbackLog {
    path: PathBuf,
    append: Mutex<()>,
}

impl FeedbackLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), append: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path { &self.path }

    pub fn record(&self, query_id: &str, relevant: bool, comments: Option<&str>) -> Result<FeedbackEntry> {
        let entry = FeedbackEntry {
            query_id: query_id.to_string(),
            relevant,
            comments: comments.map(str::to_string).filter(|c| !c.trim().is_empty()),
            recorded_at: Utc::now(),
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        let _guard = self.append.lock();
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        tracing::debug!(query_id, relevant, "recorded feedback");
        Ok(entry)
    }

    /// All entries in the order recorded; malformed lines are skipped.
    pub fn entries(&self) -> Result<Vec<FeedbackEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(fs::File::open(&self.path)?);
        let mut out = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(entry) => out.push(entry),
                Err(e) => tracing::warn!(error = %e, "skipping malformed feedback line"),
            }
        }
        Ok(out)
    }
}
