//! One upload batch: duplicate gate, rate-limited create, immediate persistence

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::Result;
use chrono::Utc;
use depoline_core::{
    CatalogClient, MigrationRecord, RateLimiter, RecordStatus, RetryPolicy, StopFlag, WorkQueue,
    call_with_retry,
};
use depoline_store::{OutcomeLog, OutcomeStatus, StateStore, UploadOutcome};
use indicatif::ProgressBar;

use crate::reporter::Reporter;

/// Whether the upload step would touch a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Upload,
    /// Accepted high-confidence duplicate; flagged instead of uploaded.
    DuplicateBlocked,
    AlreadyUploaded,
    /// Not transformed, failed, or superseded.
    NotReady,
}

pub fn eligibility(record: &MigrationRecord) -> Eligibility {
    if record.status.is_uploaded() {
        return Eligibility::AlreadyUploaded;
    }
    let ready = matches!(
        record.status,
        RecordStatus::Transformed | RecordStatus::DuplicateFlagged
    );
    if !ready || record.payload.is_none() || record.superseded {
        Eligibility::NotReady
    } else if record.is_duplicate_blocked() {
        Eligibility::DuplicateBlocked
    } else {
        Eligibility::Upload
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// A stop request left records in this batch unprocessed.
    pub interrupted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Processed {
    Succeeded,
    Failed,
    Skipped,
}

pub struct BatchUploader<'a> {
    store: &'a StateStore,
    client: &'a dyn CatalogClient,
    limiter: &'a RateLimiter,
    reporter: &'a dyn Reporter,
    stop: &'a StopFlag,
    retry: RetryPolicy,
    workers: usize,
}

impl<'a> BatchUploader<'a> {
    pub fn new(
        store: &'a StateStore,
        client: &'a dyn CatalogClient,
        limiter: &'a RateLimiter,
        reporter: &'a dyn Reporter,
        stop: &'a StopFlag,
    ) -> Self {
        Self {
            store,
            client,
            limiter,
            reporter,
            stop,
            retry: RetryPolicy::default(),
            workers: 1,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Upload `ids` in input order. Record failures are counted, never raised;
    /// an `Err` means state could not be persisted.
    pub fn run_batch(&self, ids: &[String], progress: &ProgressBar) -> Result<BatchOutcome> {
        let log = Mutex::new(self.store.open_outcome_log()?);
        let queue = WorkQueue::new(ids.iter().collect::<Vec<_>>());
        let succeeded = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);
        let skipped = AtomicUsize::new(0);
        let halt = AtomicBool::new(false);
        let fatal: Mutex<Option<anyhow::Error>> = Mutex::new(None);

        let workers = self.workers.min(ids.len()).max(1);
        rayon::scope(|s| {
            for _ in 0..workers {
                s.spawn(|_| loop {
                    if self.stop.is_requested() || halt.load(Ordering::Relaxed) {
                        break;
                    }
                    let Some((_, id)) = queue.next() else {
                        break;
                    };
                    match self.process(id, &log) {
                        Ok(Processed::Succeeded) => succeeded.fetch_add(1, Ordering::Relaxed),
                        Ok(Processed::Failed) => failed.fetch_add(1, Ordering::Relaxed),
                        Ok(Processed::Skipped) => skipped.fetch_add(1, Ordering::Relaxed),
                        Err(e) => {
                            halt.store(true, Ordering::Relaxed);
                            fatal.lock().unwrap().get_or_insert(e);
                            break;
                        }
                    };
                    progress.inc(1);
                });
            }
        });

        if let Some(e) = fatal.into_inner().unwrap() {
            return Err(e);
        }
        Ok(BatchOutcome {
            succeeded: succeeded.into_inner(),
            failed: failed.into_inner(),
            skipped: skipped.into_inner(),
            interrupted: self.stop.is_requested() && queue.remaining() > 0,
        })
    }

    fn process(&self, id: &str, log: &Mutex<OutcomeLog>) -> Result<Processed> {
        let Some(mut record) = self.store.get(id) else {
            log::warn!("{id}: not in the state store, skipping");
            return Ok(Processed::Skipped);
        };

        let outcome = match eligibility(&record) {
            Eligibility::Upload => self.upload(&mut record)?,
            Eligibility::DuplicateBlocked => {
                if record.status != RecordStatus::DuplicateFlagged {
                    record.transition(RecordStatus::DuplicateFlagged)?;
                    self.store.put(record.clone())?;
                }
                outcome(&record, OutcomeStatus::Skipped, Some("accepted high-confidence duplicate"))
            }
            Eligibility::AlreadyUploaded => {
                outcome(&record, OutcomeStatus::Skipped, Some("already uploaded"))
            }
            Eligibility::NotReady => outcome(
                &record,
                OutcomeStatus::Skipped,
                Some(&format!("not ready ({})", record.status)),
            ),
        };

        log.lock().unwrap().record(outcome.clone())?;
        self.reporter.upload_outcome(&outcome);
        Ok(match outcome.status {
            OutcomeStatus::Success => Processed::Succeeded,
            OutcomeStatus::Failed => Processed::Failed,
            OutcomeStatus::Skipped => Processed::Skipped,
        })
    }

    /// Create the deposit and persist the result. Records that already hold
    /// a remote id never get here (see [`eligibility`]).
    fn upload(&self, record: &mut MigrationRecord) -> Result<UploadOutcome> {
        let Some(payload_ref) = record.payload.clone() else {
            anyhow::bail!("{}: eligible record without payload", record.id);
        };
        let payload = match self.store.read_payload(&payload_ref) {
            Ok(p) => p.with_related_identifiers(record.related_identifiers()),
            Err(e) => {
                record.fail(format!("payload unreadable: {e:#}"));
                self.store.put(record.clone())?;
                return Ok(outcome(record, OutcomeStatus::Failed, record.last_error.as_deref()));
            }
        };

        let retried = call_with_retry(&record.id, self.limiter, &self.retry, || {
            self.client.create(&payload)
        });
        record.attempts = retried.attempts;

        let out = match retried.result {
            Ok(deposit) => {
                record.mark_uploaded(deposit.remote_id, deposit.persistent_identifier)?;
                outcome(record, OutcomeStatus::Success, None)
            }
            Err(e) => {
                record.fail(e.to_string());
                outcome(record, OutcomeStatus::Failed, record.last_error.as_deref())
            }
        };
        self.store.put(record.clone())?;
        Ok(out)
    }
}

/// What [`BatchUploader::run_batch`] would do to `ids`, applied to the store
/// without any catalog call. Used by dry runs against an overlay store;
/// uploaded records get a placeholder remote id.
pub fn simulate_batch(store: &StateStore, ids: &[String]) -> Result<BatchOutcome> {
    let mut out = BatchOutcome::default();
    for id in ids {
        let Some(mut record) = store.get(id) else {
            out.skipped += 1;
            continue;
        };
        match eligibility(&record) {
            Eligibility::Upload => {
                record.mark_uploaded(format!("dry-run:{id}"), None)?;
                out.succeeded += 1;
            }
            Eligibility::DuplicateBlocked => {
                if record.status != RecordStatus::DuplicateFlagged {
                    record.transition(RecordStatus::DuplicateFlagged)?;
                }
                out.skipped += 1;
            }
            Eligibility::AlreadyUploaded | Eligibility::NotReady => {
                out.skipped += 1;
                continue;
            }
        }
        store.put(record)?;
    }
    Ok(out)
}

fn outcome(record: &MigrationRecord, status: OutcomeStatus, error: Option<&str>) -> UploadOutcome {
    UploadOutcome {
        record_id: record.id.clone(),
        status,
        remote_id: record.remote_id.clone(),
        persistent_identifier: record.persistent_identifier.clone(),
        error: error.map(String::from),
        attempts: record.attempts,
        timestamp: Utc::now(),
    }
}
