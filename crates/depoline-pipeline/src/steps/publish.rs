//! Step 6: publish uploaded deposits (mints the DOI)

use anyhow::Result;
use depoline_core::{Environment, MigrationRecord, RecordStatus, call_with_retry};

use super::{StepContext, StepRun};

fn publishable(record: &MigrationRecord) -> bool {
    matches!(
        record.status,
        RecordStatus::Uploaded | RecordStatus::PublishFailed
    ) && record.remote_id.is_some()
        && record.verified != Some(false)
}

pub fn run(ctx: &StepContext) -> Result<StepRun> {
    if ctx.config.environment == Environment::Production && !ctx.config.allow_production_publish {
        return Ok(StepRun::declined(
            "production publishing is disabled (set allow_production_publish)",
        ));
    }

    let ids = ctx.store.ids_where(publishable);
    let held = ctx
        .store
        .ids_where(|r| {
            matches!(r.status, RecordStatus::Uploaded | RecordStatus::PublishFailed)
                && r.verified == Some(false)
        })
        .len();
    log::info!("publishing {} records, {held} held back by failed verification", ids.len());

    let mut run = StepRun::default();
    run.summary.skipped = held;
    if ctx.dry_run() {
        run.summary.succeeded = ids.len();
        return Ok(run);
    }

    let client = ctx.client()?;
    let bar = ctx.progress.batch_bar("publish", ids.len());
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

        let retried = call_with_retry(id, &ctx.limiter, &ctx.config.retry, || client.publish(&remote_id));
        match retried.result {
            Ok(deposit) => {
                record.mark_published(deposit.persistent_identifier)?;
                if record.verified == Some(true) {
                    record.transition(RecordStatus::Verified)?;
                }
                log::debug!(
                    "{id}: published as {}",
                    record.persistent_identifier.as_deref().unwrap_or("?")
                );
                run.summary.succeeded += 1;
            }
            Err(e) => {
                log::warn!("{id}: publish failed: {e}");
                record.transition(RecordStatus::PublishFailed)?;
                record.last_error = Some(e.to_string());
                run.summary.failed += 1;
            }
        }
        ctx.store.put(record)?;
        bar.inc(1);
    }
    bar.finish_and_clear();
    Ok(run)
}
