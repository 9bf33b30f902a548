//! Structured outcome sink for audit tooling

use depoline_store::{OutcomeStatus, Step, UploadOutcome};

use crate::summary::StepSummary;

pub trait Reporter: Send + Sync {
    /// Called once per record processed by an upload batch, after it is persisted.
    fn upload_outcome(&self, outcome: &UploadOutcome);

    fn step_finished(&self, step: Step, summary: &StepSummary);
}

/// Reports through the `log` facade.
pub struct LogReporter;

impl Reporter for LogReporter {
    fn upload_outcome(&self, outcome: &UploadOutcome) {
        match outcome.status {
            OutcomeStatus::Success => log::debug!(
                "{}: uploaded as {} after {} attempt(s)",
                outcome.record_id,
                outcome.remote_id.as_deref().unwrap_or("?"),
                outcome.attempts
            ),
            OutcomeStatus::Failed => log::warn!(
                "{}: upload failed: {}",
                outcome.record_id,
                outcome.error.as_deref().unwrap_or("unknown error")
            ),
            OutcomeStatus::Skipped => log::debug!(
                "{}: skipped{}",
                outcome.record_id,
                outcome
                    .error
                    .as_deref()
                    .map(|r| format!(" ({r})"))
                    .unwrap_or_default()
            ),
        }
    }

    fn step_finished(&self, step: Step, summary: &StepSummary) {
        log::info!(
            "{step}: {} succeeded, {} failed, {} skipped",
            summary.succeeded,
            summary.failed,
            summary.skipped
        );
    }
}
