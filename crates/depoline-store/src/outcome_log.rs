//! Per-batch upload outcome logs (`uploads/upload_log_<ts>.json`)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::atomic;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    pub record_id: String,
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub attempts: u32,
    pub timestamp: DateTime<Utc>,
}

/// JSON array rewritten atomically after each outcome.
pub struct OutcomeLog {
    path: PathBuf,
    entries: Vec<UploadOutcome>,
}

impl OutcomeLog {
    /// Start a new log in `dir` named after the current time.
    pub fn create(dir: &Path) -> Result<Self> {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S%.3f");
        let mut path = dir.join(format!("upload_log_{stamp}.json"));
        let mut n = 1;
        while path.exists() {
            path = dir.join(format!("upload_log_{stamp}_{n}.json"));
            n += 1;
        }
        let log = Self {
            path,
            entries: Vec::new(),
        };
        log.flush()?;
        Ok(log)
    }

    pub fn record(&mut self, outcome: UploadOutcome) -> Result<()> {
        self.entries.push(outcome);
        self.flush()
    }

    fn flush(&self) -> Result<()> {
        atomic::write_json_atomic(&self.path, &self.entries)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Every outcome from every log in `dir`, oldest log first.
pub fn load_all(dir: &Path) -> Result<Vec<UploadOutcome>> {
    let pattern = dir.join("upload_log_*.json");
    let mut paths: Vec<_> = glob::glob(&pattern.to_string_lossy())
        .context("invalid glob pattern")?
        .filter_map(|e| e.ok())
        .collect();
    paths.sort();

    let mut all = Vec::new();
    for path in paths {
        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        match serde_json::from_str::<Vec<UploadOutcome>>(&json) {
            Ok(entries) => all.extend(entries),
            Err(e) => log::warn!("skipping unreadable outcome log {}: {e}", path.display()),
        }
    }
    Ok(all)
}
