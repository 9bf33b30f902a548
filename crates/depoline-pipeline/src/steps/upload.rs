//! Step 3: batched uploads with a pause point after each batch

use anyhow::Result;
use depoline_core::RecordStatus;

use super::{StepContext, StepRun};
use crate::prompt::{PausePoint, PromptAnswer};
use crate::summary::StepSummary;
use crate::uploader::{BatchUploader, Eligibility, eligibility, simulate_batch};

pub fn run(ctx: &StepContext) -> Result<StepRun> {
    let records = ctx.store.records();
    let mut already = 0;
    let mut ids = Vec::new();
    let mut blocked = 0;
    for record in &records {
        match eligibility(record) {
            Eligibility::Upload => ids.push(record.id.clone()),
            // Blocked after the duplicate step ran; the uploader flags it.
            Eligibility::DuplicateBlocked if record.status != RecordStatus::DuplicateFlagged => {
                ids.push(record.id.clone())
            }
            Eligibility::DuplicateBlocked => blocked += 1,
            Eligibility::AlreadyUploaded => already += 1,
            Eligibility::NotReady => {}
        }
    }
    if let Some(limit) = ctx.config.limit {
        ids.truncate(limit);
    }
    log::info!(
        "{} records to upload, {already} already uploaded, {blocked} blocked as duplicates",
        ids.len()
    );

    let mut run = StepRun::counts(StepSummary {
        skipped: blocked,
        ..StepSummary::default()
    });
    if ids.is_empty() {
        return Ok(run);
    }

    // Dry runs walk the same batches and pause points against the overlay.
    let uploader = if ctx.dry_run() {
        None
    } else {
        let client = ctx.client()?;
        Some(
            BatchUploader::new(ctx.store, client, &ctx.limiter, ctx.reporter, ctx.stop)
                .with_retry(ctx.config.retry)
                .with_workers(ctx.config.workers),
        )
    };

    let batches: Vec<&[String]> = ids.chunks(ctx.config.batch_size).collect();
    let n = batches.len();
    for (i, batch) in batches.into_iter().enumerate() {
        if ctx.stop.is_requested() {
            run.interrupted = true;
            break;
        }
        let bar = ctx
            .progress
            .batch_bar(&format!("batch {}/{n}", i + 1), batch.len());
        let out = match &uploader {
            Some(uploader) => uploader.run_batch(batch, &bar)?,
            None => simulate_batch(ctx.store, batch)?,
        };
        bar.finish_and_clear();
        run.summary.add(StepSummary {
            succeeded: out.succeeded,
            failed: out.failed,
            skipped: out.skipped,
        });
        log::info!(
            "batch {}/{n}: {} uploaded, {} failed, {} skipped",
            i + 1,
            out.succeeded,
            out.failed,
            out.skipped
        );

        if out.interrupted {
            run.interrupted = true;
            break;
        }
        if ctx.config.abort_on_failure && out.failed > 0 {
            break;
        }
        if ctx.config.interactive && i + 1 < n {
            match ctx.prompt.ask(PausePoint::AfterBatch {
                batch: i + 1,
                batches: n,
            }) {
                PromptAnswer::Continue => {}
                PromptAnswer::Stop => {
                    ctx.stop.request();
                    run.interrupted = true;
                    break;
                }
                PromptAnswer::Skip => {
                    let left = n - i - 1;
                    log::info!("skipping the remaining {left} batch(es)");
                    run.warnings
                        .push(format!("upload: {left} batch(es) skipped at the prompt"));
                    break;
                }
            }
        }
    }
    Ok(run)
}
