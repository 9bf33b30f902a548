//! Durable migration state for one destination environment
//!
//! Directory layout:
//! ```text
//! {output}/
//! ├── state/{env}/
//! │   ├── payloads/{id}.json        # payload envelopes
//! │   ├── checkpoint.json           # PipelineCheckpoint
//! │   ├── records.jsonl             # record journal (last write wins)
//! │   ├── run.lock                  # PID lock
//! │   └── uploads/upload_log_{ts}.json
//! └── reports/{env}/
//!     ├── audit_{ts}.json
//!     └── verification_{ts}.json
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use depoline_core::{Environment, MigrationRecord, Payload, PayloadRef, RecordStatus};
use serde::Serialize;

use crate::atomic;
use crate::checkpoint::PipelineCheckpoint;
use crate::journal::{self, Journal};
use crate::lock::RunLock;
use crate::outcome_log::{self, OutcomeLog, UploadOutcome};
use crate::payloads::PayloadStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// Takes the run lock; all mutations are persisted.
    ReadWrite,
    /// No lock, no writes. Mutating calls fail.
    ReadOnly,
    /// No lock, no writes. Record and payload changes land in an in-memory
    /// overlay over the persisted state; checkpoints, logs and reports fail.
    DryRun,
}

/// Where each piece of state lives under the output directory.
#[derive(Debug, Clone)]
pub struct StatePaths {
    output: PathBuf,
    environment: Environment,
}

impl StatePaths {
    pub fn new(output: &Path, environment: Environment) -> Self {
        Self {
            output: output.to_path_buf(),
            environment,
        }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn state_dir(&self) -> PathBuf {
        self.output.join("state").join(self.environment.as_str())
    }

    pub fn checkpoint(&self) -> PathBuf {
        self.state_dir().join("checkpoint.json")
    }

    pub fn journal(&self) -> PathBuf {
        self.state_dir().join("records.jsonl")
    }

    pub fn lock(&self) -> PathBuf {
        self.state_dir().join("run.lock")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.state_dir().join("uploads")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.output.join("reports").join(self.environment.as_str())
    }

    pub fn payloads_dir(&self) -> PathBuf {
        self.state_dir().join("payloads")
    }
}

pub struct StateStore {
    paths: StatePaths,
    mode: StoreMode,
    records: Mutex<BTreeMap<String, MigrationRecord>>,
    journal: Option<Mutex<Journal>>,
    payloads: PayloadStore,
    _lock: Option<RunLock>,
}

impl StateStore {
    pub fn open(output: &Path, environment: Environment, mode: StoreMode) -> Result<Self> {
        let paths = StatePaths::new(output, environment);
        if mode != StoreMode::ReadWrite {
            let payloads = match mode {
                StoreMode::DryRun => PayloadStore::staged(&paths.payloads_dir()),
                _ => PayloadStore::new(&paths.payloads_dir()),
            };
            let replay = journal::replay(&paths.journal())?;
            return Ok(Self {
                paths,
                mode,
                records: Mutex::new(replay.records),
                journal: None,
                payloads,
                _lock: None,
            });
        }
        let payloads = PayloadStore::new(&paths.payloads_dir());

        for dir in [
            paths.state_dir(),
            paths.uploads_dir(),
            paths.reports_dir(),
            paths.payloads_dir(),
        ] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("output directory not writable: {}", dir.display()))?;
        }
        let lock = RunLock::acquire(&paths.lock())?;
        for dir in [paths.state_dir(), paths.uploads_dir(), paths.payloads_dir()] {
            atomic::cleanup_tmp_files(&dir)?;
        }

        let replay = journal::replay(&paths.journal())?;
        let mut journal = Journal::open(&paths.journal())?;
        if replay.corrupt_lines > 0 || replay.lines > 2 * replay.records.len() + 64 {
            log::debug!(
                "compacting journal: {} lines for {} records",
                replay.lines,
                replay.records.len()
            );
            journal.compact(replay.records.values())?;
        }
        log::debug!(
            "state store {}: {} records",
            paths.state_dir().display(),
            replay.records.len()
        );

        Ok(Self {
            paths,
            mode,
            records: Mutex::new(replay.records),
            journal: Some(Mutex::new(journal)),
            payloads,
            _lock: Some(lock),
        })
    }

    pub fn paths(&self) -> &StatePaths {
        &self.paths
    }

    pub fn mode(&self) -> StoreMode {
        self.mode
    }

    fn writable(&self) -> Result<&Mutex<Journal>> {
        match (&self.journal, self.mode) {
            (Some(j), _) => Ok(j),
            (None, StoreMode::DryRun) => bail!("state store is a dry-run overlay"),
            (None, _) => bail!("state store is read-only"),
        }
    }

    pub fn get(&self, id: &str) -> Option<MigrationRecord> {
        self.records.lock().unwrap().get(id).cloned()
    }

    /// All records ordered by id.
    pub fn records(&self) -> Vec<MigrationRecord> {
        self.records.lock().unwrap().values().cloned().collect()
    }

    pub fn ids_where(&self, pred: impl Fn(&MigrationRecord) -> bool) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .values()
            .filter(|r| pred(r))
            .map(|r| r.id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Persist a record (journal append + fsync), then publish it in memory.
    /// A dry-run store only updates memory.
    pub fn put(&self, mut record: MigrationRecord) -> Result<()> {
        record.updated_at = Utc::now();
        if self.mode != StoreMode::DryRun {
            self.writable()?.lock().unwrap().append(&record)?;
        }
        self.records
            .lock()
            .unwrap()
            .insert(record.id.clone(), record);
        Ok(())
    }

    /// Counts per status, in status order, including zeros.
    pub fn status_counts(&self) -> Vec<(RecordStatus, usize)> {
        let records = self.records.lock().unwrap();
        RecordStatus::ALL
            .into_iter()
            .map(|s| (s, records.values().filter(|r| r.status == s).count()))
            .collect()
    }

    pub fn load_checkpoint(&self) -> Result<Option<PipelineCheckpoint>> {
        PipelineCheckpoint::load(&self.paths.checkpoint())
    }

    pub fn save_checkpoint(&self, checkpoint: &PipelineCheckpoint) -> Result<()> {
        self.writable()?;
        checkpoint.save(&self.paths.checkpoint())
    }

    /// Move the current checkpoint aside so a fresh run can start. Records stay.
    pub fn archive_checkpoint(&self) -> Result<Option<PathBuf>> {
        self.writable()?;
        let current = self.paths.checkpoint();
        if !current.exists() {
            return Ok(None);
        }
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let archived = self.paths.state_dir().join(format!("checkpoint_{stamp}.json"));
        fs::rename(&current, &archived).with_context(|| {
            format!("failed to archive {} -> {}", current.display(), archived.display())
        })?;
        Ok(Some(archived))
    }

    pub fn write_payload(&self, id: &str, payload: &Payload) -> Result<PayloadRef> {
        if self.mode != StoreMode::DryRun {
            self.writable()?;
        }
        self.payloads.write(id, payload)
    }

    pub fn read_payload(&self, payload_ref: &PayloadRef) -> Result<Payload> {
        self.payloads.read(payload_ref)
    }

    /// Payload present and matching its recorded hash.
    pub fn verify_payload(&self, payload_ref: &PayloadRef) -> Result<bool> {
        self.payloads.verify(payload_ref)
    }

    pub fn open_outcome_log(&self) -> Result<OutcomeLog> {
        self.writable()?;
        OutcomeLog::create(&self.paths.uploads_dir())
    }

    pub fn outcomes(&self) -> Result<Vec<UploadOutcome>> {
        outcome_log::load_all(&self.paths.uploads_dir())
    }

    /// Write `reports/<env>/<kind>_<ts>.json`.
    pub fn write_report<T: Serialize>(&self, kind: &str, report: &T) -> Result<PathBuf> {
        self.writable()?;
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let path = self.paths.reports_dir().join(format!("{kind}_{stamp}.json"));
        atomic::write_json_atomic(&path, report)?;
        Ok(path)
    }
}
