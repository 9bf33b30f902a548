//! Step 4: read-only consistency report over the record store and outcome logs

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use depoline_core::{Environment, MigrationRecord, RecordStatus};
use depoline_store::{OutcomeStatus, UploadOutcome};
use rustc_hash::FxHashMap;
use serde::Serialize;

use super::{StepContext, StepRun};
use crate::summary::StepSummary;

const MAX_REASON_LEN: usize = 120;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub generated_at: DateTime<Utc>,
    pub environment: Environment,
    pub total_records: usize,
    pub status_counts: BTreeMap<String, usize>,
    pub superseded: usize,
    pub outcome_totals: OutcomeTotals,
    pub error_histogram: Vec<ErrorBucket>,
    pub integrity_issues: Vec<IntegrityIssue>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct OutcomeTotals {
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBucket {
    pub reason: String,
    pub count: usize,
    pub example_record: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityIssue {
    pub record_id: String,
    pub issue: String,
}

/// Collapse record-specific detail (numbers, ids) so similar errors bucket together.
pub fn normalize_reason(reason: &str) -> String {
    let mut out = String::with_capacity(reason.len());
    let mut in_digits = false;
    for c in reason.split_whitespace().collect::<Vec<_>>().join(" ").chars() {
        if c.is_ascii_digit() {
            if !in_digits {
                out.push('#');
            }
            in_digits = true;
        } else {
            in_digits = false;
            out.push(c);
        }
    }
    if out.chars().count() > MAX_REASON_LEN {
        out = out.chars().take(MAX_REASON_LEN).collect::<String>() + "...";
    }
    out
}

/// DOIs look like `10.<registrant>/<suffix>`.
pub fn is_plausible_doi(doi: &str) -> bool {
    doi.strip_prefix("10.")
        .and_then(|rest| rest.split_once('/'))
        .is_some_and(|(registrant, suffix)| !registrant.is_empty() && !suffix.is_empty())
}

fn integrity_issues(record: &MigrationRecord) -> Vec<String> {
    let mut issues = Vec::new();
    if record.status.is_uploaded() && record.remote_id.is_none() {
        issues.push(format!("{} without remote id", record.status));
    }
    if matches!(
        record.status,
        RecordStatus::Transformed | RecordStatus::DuplicateFlagged
    ) && record.payload.is_none()
    {
        issues.push(format!("{} without payload", record.status));
    }
    if matches!(record.status, RecordStatus::Published | RecordStatus::Verified)
        && record.persistent_identifier.is_none()
    {
        issues.push("published without DOI".to_string());
    }
    if let Some(doi) = &record.persistent_identifier {
        if !is_plausible_doi(doi) {
            issues.push(format!("malformed DOI: {doi}"));
        }
    }
    issues
}

pub fn build_report(
    environment: Environment,
    records: &[MigrationRecord],
    outcomes: &[UploadOutcome],
) -> AuditReport {
    let mut status_counts: BTreeMap<String, usize> = RecordStatus::ALL
        .into_iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();
    let mut buckets: FxHashMap<String, (usize, String)> = FxHashMap::default();
    let mut integrity = Vec::new();
    let mut unresolved = 0;
    for record in records {
        *status_counts.entry(record.status.as_str().to_string()).or_default() += 1;
        if record.status == RecordStatus::Failed {
            let reason = normalize_reason(record.last_error.as_deref().unwrap_or("unknown error"));
            buckets
                .entry(reason)
                .or_insert_with(|| (0, record.id.clone()))
                .0 += 1;
        }
        if record.candidates.iter().any(|c| c.decision.is_open()) {
            unresolved += 1;
        }
        integrity.extend(integrity_issues(record).into_iter().map(|issue| IntegrityIssue {
            record_id: record.id.clone(),
            issue,
        }));
    }

    let mut error_histogram: Vec<ErrorBucket> = buckets
        .into_iter()
        .map(|(reason, (count, example_record))| ErrorBucket {
            reason,
            count,
            example_record,
        })
        .collect();
    error_histogram.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.reason.cmp(&b.reason)));

    let mut outcome_totals = OutcomeTotals::default();
    for o in outcomes {
        match o.status {
            OutcomeStatus::Success => outcome_totals.success += 1,
            OutcomeStatus::Failed => outcome_totals.failed += 1,
            OutcomeStatus::Skipped => outcome_totals.skipped += 1,
        }
    }

    let count = |s: RecordStatus| records.iter().filter(|r| r.status == s).count();
    let mut recommendations = Vec::new();
    let failed = count(RecordStatus::Failed);
    if failed > 0 {
        recommendations.push(format!(
            "{failed} record(s) failed; inspect the error histogram, then run `depoline retry` and resume"
        ));
    }
    if unresolved > 0 {
        recommendations.push(format!(
            "{unresolved} record(s) have undecided duplicate candidates; run `depoline review`"
        ));
    }
    let flagged = count(RecordStatus::DuplicateFlagged);
    if flagged > 0 {
        recommendations.push(format!(
            "{flagged} record(s) were not uploaded because an accepted duplicate exists"
        ));
    }
    if !integrity.is_empty() {
        recommendations.push(format!(
            "{} integrity issue(s) need manual attention before publishing",
            integrity.len()
        ));
    }

    AuditReport {
        generated_at: Utc::now(),
        environment,
        total_records: records.len(),
        status_counts,
        superseded: records.iter().filter(|r| r.superseded).count(),
        outcome_totals,
        error_histogram,
        integrity_issues: integrity,
        recommendations,
    }
}

pub fn run(ctx: &StepContext) -> Result<StepRun> {
    let records = ctx.store.records();
    let outcomes = ctx.store.outcomes()?;
    let report = build_report(ctx.config.environment, &records, &outcomes);

    for bucket in report.error_histogram.iter().take(5) {
        log::info!("{:>5} x {}", bucket.count, bucket.reason);
    }
    for issue in &report.integrity_issues {
        log::warn!("{}: {}", issue.record_id, issue.issue);
    }

    let mut run = StepRun::counts(StepSummary {
        succeeded: report.total_records,
        ..StepSummary::default()
    });
    run.warnings = report
        .integrity_issues
        .iter()
        .map(|i| format!("audit: {}: {}", i.record_id, i.issue))
        .collect();
    if !ctx.dry_run() {
        let path = ctx.store.write_report("audit", &report)?;
        log::info!("audit report: {}", path.display());
        run.report = Some(path);
    }
    Ok(run)
}
