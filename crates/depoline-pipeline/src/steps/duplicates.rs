//! Step 2: score transformed records against known records and registries

use std::path::PathBuf;

use anyhow::Result;
use depoline_core::{MigrationRecord, RecordStatus};
use depoline_matching::{
    DestinationSearch, LocalRegistry, MatchingEngine, RegistryAdapter, carry_decisions,
};

use super::{StepContext, StepRun};
use crate::curator::{Curator, curate};
use crate::summary::StepSummary;

/// Candidate sources beyond the record store itself.
#[derive(Default)]
pub struct MatchingSetup {
    /// JSON files of already-registered datasets.
    pub registry_files: Vec<PathBuf>,
    pub adapters: Vec<Box<dyn RegistryAdapter>>,
    /// Also search the destination catalog by title.
    pub search_destination: bool,
}

fn is_candidate(record: &MigrationRecord) -> bool {
    matches!(
        record.status,
        RecordStatus::Transformed | RecordStatus::DuplicateFlagged
    ) && record.descriptor.is_some()
        && !record.superseded
}

/// Builds the engine, consuming `setup`'s adapters. Destination search
/// needs a client, which a dry run may not have.
fn engine(ctx: &StepContext, setup: MatchingSetup) -> MatchingEngine {
    let records = ctx.store.records();
    let mut local = LocalRegistry::from_records(&records);
    for path in &setup.registry_files {
        match local.extend_from_file(path) {
            Ok(n) => log::info!("{}: {n} registry entries", path.display()),
            Err(e) => log::warn!("{}: {e}", path.display()),
        }
    }

    let mut engine = MatchingEngine::new(ctx.config.matching.clone(), local);
    if setup.search_destination {
        if let Some(client) = &ctx.client {
            engine = engine.with_destination(DestinationSearch {
                client: client.clone(),
                limiter: ctx.limiter.clone(),
                retry: ctx.config.retry,
            });
        } else {
            log::warn!("no catalog client, destination search skipped");
        }
    }
    for adapter in setup.adapters {
        engine = engine.with_adapter(adapter);
    }
    engine
}

pub fn run(ctx: &StepContext, setup: MatchingSetup, curator: Option<&dyn Curator>) -> Result<StepRun> {
    let engine = engine(ctx, setup);
    let ids = ctx.store.ids_where(is_candidate);
    log::info!(
        "checking {} records against {}",
        ids.len(),
        engine.source_names().join(", ")
    );

    let bar = ctx.progress.batch_bar("duplicates", ids.len());
    let mut run = StepRun::default();
    for id in &ids {
        if ctx.stop.is_requested() {
            run.interrupted = true;
            break;
        }
        let Some(mut record) = ctx.store.get(id) else {
            continue;
        };

        let mut fresh = engine.find_candidates(&record);
        carry_decisions(&record.candidates, &mut fresh);
        record.candidates = fresh;
        if let Some(curator) = curator {
            let decided = ctx.progress.suspend(|| curate(&mut record, curator));
            if decided > 0 {
                log::debug!("{id}: {decided} candidate decision(s)");
            }
        }

        let blocked = record.is_duplicate_blocked();
        if blocked {
            log::info!("{id}: accepted high-confidence duplicate, upload blocked");
            if record.status == RecordStatus::Transformed {
                record.transition(RecordStatus::DuplicateFlagged)?;
            }
        }
        ctx.store.put(record)?;
        run.summary.add(StepSummary {
            succeeded: usize::from(!blocked),
            skipped: usize::from(blocked),
            failed: 0,
        });
        bar.inc(1);
    }
    bar.finish_and_clear();
    Ok(run)
}
