//! Step 5: compare uploaded deposits against what was sent

use std::collections::BTreeSet;

use anyhow::Result;
use chrono::{DateTime, Utc};
use depoline_core::{
    Environment, MigrationRecord, RecordDescriptor, RecordStatus, RemoteRecord, call_with_retry,
};
use serde::Serialize;

use super::{StepContext, StepRun};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldMismatch {
    pub field: &'static str,
    pub expected: String,
    pub actual: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationEntry {
    pub record_id: String,
    pub remote_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mismatches: Vec<FieldMismatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub generated_at: DateTime<Utc>,
    pub environment: Environment,
    pub checked: usize,
    pub passed: usize,
    /// Records that mismatched or could not be fetched.
    pub problems: Vec<VerificationEntry>,
}

fn keyword_set(keywords: &[String]) -> BTreeSet<String> {
    keywords.iter().map(|k| k.trim().to_lowercase()).collect()
}

/// Fields where the destination disagrees with the descriptor.
pub fn compare(expected: &RecordDescriptor, remote: &RemoteRecord) -> Vec<FieldMismatch> {
    let mut out = Vec::new();
    if expected.title.trim() != remote.title.trim() {
        out.push(FieldMismatch {
            field: "title",
            expected: expected.title.clone(),
            actual: remote.title.clone(),
        });
    }
    if expected.creators.len() != remote.creators.len() {
        out.push(FieldMismatch {
            field: "creators",
            expected: expected.creators.len().to_string(),
            actual: remote.creators.len().to_string(),
        });
    }
    let (want, got) = (keyword_set(&expected.keywords), keyword_set(&remote.keywords));
    if want != got {
        let join = |s: &BTreeSet<String>| s.iter().cloned().collect::<Vec<_>>().join(", ");
        out.push(FieldMismatch {
            field: "keywords",
            expected: join(&want),
            actual: join(&got),
        });
    }
    out
}

fn needs_verification(record: &MigrationRecord) -> bool {
    matches!(
        record.status,
        RecordStatus::Uploaded | RecordStatus::PublishFailed | RecordStatus::Published
    ) && record.remote_id.is_some()
        && record.verified != Some(true)
}

pub fn run(ctx: &StepContext) -> Result<StepRun> {
    let ids = ctx.store.ids_where(needs_verification);
    log::info!("verifying {} uploaded records", ids.len());
    if ctx.dry_run() {
        let mut run = StepRun::default();
        run.summary.succeeded = ids.len();
        return Ok(run);
    }

    let client = ctx.client()?;
    let bar = ctx.progress.batch_bar("verify", ids.len());
    let mut run = StepRun::default();
    let mut problems = Vec::new();
    for id in &ids {
        if ctx.stop.is_requested() {
            run.interrupted = true;
            break;
        }
        let Some(mut record) = ctx.store.get(id) else {
            continue;
        };
        let Some(remote_id) = record.remote_id.clone() else {
            continue;
        };

        let retried = call_with_retry(id, &ctx.limiter, &ctx.config.retry, || client.get(&remote_id));
        let entry = match retried.result {
            Ok(remote) => {
                let mismatches = record
                    .descriptor
                    .as_ref()
                    .map(|d| compare(d, &remote))
                    .unwrap_or_default();
                if mismatches.is_empty() {
                    record.verified = Some(true);
                    if record.status == RecordStatus::Published {
                        record.transition(RecordStatus::Verified)?;
                    }
                    None
                } else {
                    let fields: Vec<_> = mismatches.iter().map(|m| m.field).collect();
                    record.verified = Some(false);
                    record.last_error = Some(format!("verification: {} differ", fields.join(", ")));
                    Some(VerificationEntry {
                        record_id: id.clone(),
                        remote_id,
                        mismatches,
                        error: None,
                    })
                }
            }
            Err(e) => {
                record.last_error = Some(format!("verification: {e}"));
                Some(VerificationEntry {
                    record_id: id.clone(),
                    remote_id,
                    mismatches: Vec::new(),
                    error: Some(e.to_string()),
                })
            }
        };
        ctx.store.put(record)?;
        match entry {
            None => run.summary.succeeded += 1,
            Some(e) => {
                log::warn!(
                    "{}: verification failed{}",
                    e.record_id,
                    e.error.as_deref().map(|m| format!(": {m}")).unwrap_or_default()
                );
                run.summary.failed += 1;
                problems.push(e);
            }
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    let report = VerificationReport {
        generated_at: Utc::now(),
        environment: ctx.config.environment,
        checked: run.summary.succeeded + run.summary.failed,
        passed: run.summary.succeeded,
        problems,
    };
    let path = ctx.store.write_report("verification", &report)?;
    log::info!("verification report: {}", path.display());
    run.report = Some(path);
    Ok(run)
}
