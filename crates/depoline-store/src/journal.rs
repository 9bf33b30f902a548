//! Append-only record journal (`records.jsonl`).
//!
//! One JSON record per line; replay keeps the last line per id, so writes
//! from concurrent workers may land in any order.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use depoline_core::MigrationRecord;

use crate::atomic;

/// Replayed journal contents.
#[derive(Debug, Default)]
pub struct Replay {
    pub records: BTreeMap<String, MigrationRecord>,
    /// Lines read, including superseded and unreadable ones.
    pub lines: usize,
    pub corrupt_lines: usize,
}

pub struct Journal {
    path: PathBuf,
    file: File,
}

impl Journal {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open journal {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Append one record and fsync before returning.
    pub fn append(&mut self, record: &MigrationRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record).context("failed to serialize record")?;
        line.push(b'\n');
        self.file
            .write_all(&line)
            .with_context(|| format!("failed to append to {}", self.path.display()))?;
        self.file
            .sync_data()
            .with_context(|| format!("failed to sync {}", self.path.display()))?;
        Ok(())
    }

    /// Rewrite the journal with one line per record, then reopen for append.
    pub fn compact<'a>(
        &mut self,
        records: impl IntoIterator<Item = &'a MigrationRecord>,
    ) -> Result<()> {
        let mut buf = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buf, record).context("failed to serialize record")?;
            buf.push(b'\n');
        }
        atomic::write_atomic(&self.path, &buf)?;
        *self = Self::open(&self.path)?;
        Ok(())
    }
}

/// Read a journal, keeping the last entry for each id.
///
/// An unparseable line (typically a torn final write) is skipped with a warning.
pub fn replay(path: &Path) -> Result<Replay> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Replay::default()),
        Err(e) => return Err(e).with_context(|| format!("failed to open {}", path.display())),
    };
    let mut replay = Replay::default();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        replay.lines += 1;
        match serde_json::from_str::<MigrationRecord>(&line) {
            Ok(record) => {
                replay.records.insert(record.id.clone(), record);
            }
            Err(e) => {
                replay.corrupt_lines += 1;
                log::warn!("{}:{}: skipping unreadable entry: {e}", path.display(), n + 1);
            }
        }
    }
    Ok(replay)
}
