//! Step 1: source files -> hashed payload files

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use depoline_core::{MigrationRecord, RecordStatus, Transformer};
use rayon::prelude::*;
use rustc_hash::FxHashSet;

use super::{StepContext, StepRun};
use crate::summary::StepSummary;

/// Source files under `dir` matching `pattern`, sorted, keyed by file stem.
///
/// The first file wins when two share a stem.
pub fn discover(dir: &Path, pattern: &str, limit: Option<usize>) -> Result<Vec<(String, PathBuf)>> {
    anyhow::ensure!(dir.is_dir(), "source directory not found: {}", dir.display());
    let full = dir.join(pattern);
    let mut paths: Vec<PathBuf> = glob::glob(&full.to_string_lossy())
        .with_context(|| format!("invalid source pattern: {pattern}"))?
        .filter_map(|e| e.ok())
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    let mut seen = FxHashSet::default();
    let mut sources = Vec::with_capacity(paths.len());
    for path in paths {
        let Some(id) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        if !seen.insert(id.clone()) {
            log::warn!("{}: duplicate record id {id}, ignoring", path.display());
            continue;
        }
        sources.push((id, path));
    }
    if let Some(limit) = limit {
        sources.truncate(limit);
    }
    Ok(sources)
}

/// Whether a record (if any) needs its payload (re)built.
///
/// Failed records wait for an explicit retry.
fn needs_transform(ctx: &StepContext, record: Option<&MigrationRecord>) -> bool {
    let Some(record) = record else {
        return true;
    };
    match record.status {
        RecordStatus::Pending => true,
        RecordStatus::Transformed | RecordStatus::DuplicateFlagged => match &record.payload {
            None => true,
            Some(r) => !ctx.store.verify_payload(r).unwrap_or(false),
        },
        _ => false,
    }
}

pub fn run(ctx: &StepContext, transformer: &dyn Transformer) -> Result<StepRun> {
    let sources = discover(&ctx.config.source_dir, transformer.source_pattern(), ctx.config.limit)?;
    let pending: Vec<&(String, PathBuf)> = sources
        .iter()
        .filter(|(id, _)| needs_transform(ctx, ctx.store.get(id).as_ref()))
        .collect();
    let mut summary = StepSummary {
        skipped: sources.len() - pending.len(),
        ..StepSummary::default()
    };
    log::info!(
        "{} source files, {} to transform",
        sources.len(),
        pending.len()
    );

    let superseded = if ctx.config.limit.is_none() {
        mark_superseded(ctx, &sources)?
    } else {
        0
    };
    if superseded > 0 {
        log::warn!("{superseded} records no longer have a source file; marked superseded");
    }

    let bar = ctx.progress.batch_bar("transform", pending.len());
    let results: Vec<Option<bool>> = pending
        .par_iter()
        .map(|(id, path)| -> Result<Option<bool>> {
            if ctx.stop.is_requested() {
                return Ok(None);
            }
            let ok = transform_one(ctx, transformer, id, path)?;
            bar.inc(1);
            Ok(Some(ok))
        })
        .collect::<Result<_>>()?;
    bar.finish_and_clear();

    let mut run = StepRun::default();
    for r in results {
        match r {
            Some(true) => summary.succeeded += 1,
            Some(false) => summary.failed += 1,
            None => run.interrupted = true,
        }
    }
    run.summary = summary;
    Ok(run)
}

/// Transform one source and persist the outcome. `Ok(false)` is a record failure.
fn transform_one(
    ctx: &StepContext,
    transformer: &dyn Transformer,
    id: &str,
    path: &Path,
) -> Result<bool> {
    let mut record = ctx
        .store
        .get(id)
        .unwrap_or_else(|| MigrationRecord::new(id));
    record.superseded = false;

    match transformer.transform(path) {
        Ok(t) => {
            let payload_ref = ctx.store.write_payload(id, &t.payload)?;
            record.payload = Some(payload_ref);
            record.descriptor = Some(t.descriptor);
            if record.status != RecordStatus::DuplicateFlagged {
                record.transition(RecordStatus::Transformed)?;
            }
            ctx.store.put(record)?;
            Ok(true)
        }
        Err(e) => {
            log::warn!("{id}: {e}");
            record.fail(format!("transform: {e}"));
            ctx.store.put(record)?;
            Ok(false)
        }
    }
}

fn mark_superseded(ctx: &StepContext, sources: &[(String, PathBuf)]) -> Result<usize> {
    let present: FxHashSet<&str> = sources.iter().map(|(id, _)| id.as_str()).collect();
    let gone: Vec<MigrationRecord> = ctx
        .store
        .records()
        .into_iter()
        .filter(|r| !r.superseded && !present.contains(r.id.as_str()))
        .collect();
    let count = gone.len();
    for mut record in gone {
        record.superseded = true;
        ctx.store.put(record)?;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_sorts_dedupes_and_limits() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        for name in ["b.xml", "a.xml", "sub/a.xml", "c.txt", "d.xml"] {
            std::fs::write(dir.path().join(name), "<x/>").unwrap();
        }

        let all = discover(dir.path(), "**/*.xml", None).unwrap();
        let ids: Vec<_> = all.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "d"]);
        assert!(all[0].1.ends_with("a.xml") && !all[0].1.ends_with("sub/a.xml"));

        let limited = discover(dir.path(), "**/*.xml", Some(2)).unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn missing_source_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover(&dir.path().join("nope"), "*.xml", None).unwrap_err();
        assert!(err.to_string().contains("source directory not found"));
    }
}
