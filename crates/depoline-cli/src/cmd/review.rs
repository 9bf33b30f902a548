//! `depoline review` - decide open duplicate candidates between runs

use std::io::IsTerminal;

use anyhow::Result;
use clap::Args;
use depoline_core::{RecordStatus, global_stop};
use depoline_pipeline::{Curator, TerminalCurator, ThresholdCurator, curate};
use depoline_store::{StateStore, StoreMode};

use super::TargetArgs;
use crate::config::Config;

#[derive(Args, Debug, Default)]
pub struct ReviewArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Accept candidates at or above the auto-accept threshold, defer the rest
    #[arg(long)]
    pub auto_accept: bool,

    /// Review at most N records
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct ReviewTotals {
    reviewed: usize,
    decided: usize,
    blocked: usize,
}

fn review(store: &StateStore, curator: &dyn Curator, limit: Option<usize>) -> Result<ReviewTotals> {
    let ids = store.ids_where(|r| r.candidates.iter().any(|c| c.decision.is_open()));
    let stop = global_stop();
    let mut totals = ReviewTotals::default();

    for id in ids.iter().take(limit.unwrap_or(usize::MAX)) {
        if stop.is_requested() {
            break;
        }
        let Some(mut record) = store.get(id) else {
            continue;
        };
        totals.reviewed += 1;
        let decided = curate(&mut record, curator);
        if decided == 0 {
            continue;
        }
        totals.decided += decided;
        if record.is_duplicate_blocked() {
            totals.blocked += 1;
            if record.status == RecordStatus::Transformed {
                record.transition(RecordStatus::DuplicateFlagged)?;
            }
        }
        store.put(record)?;
    }
    Ok(totals)
}

pub fn run(args: ReviewArgs, config: &Config) -> Result<u8> {
    let output = args.target.output_dir(config);
    let store = StateStore::open(&output, args.target.environment(), StoreMode::ReadWrite)?;

    let curator: Box<dyn Curator> = if args.auto_accept {
        Box::new(ThresholdCurator {
            threshold: config.pipeline.auto_accept_threshold,
        })
    } else {
        anyhow::ensure!(
            std::io::stdin().is_terminal(),
            "review needs an interactive terminal (or pass --auto-accept)"
        );
        Box::new(TerminalCurator)
    };

    let totals = review(&store, curator.as_ref(), args.limit)?;
    if totals.reviewed == 0 {
        eprintln!("No open duplicate candidates.");
        return Ok(0);
    }
    eprintln!(
        "\nReviewed {} record(s): {} decision(s), {} record(s) now blocked from upload.",
        totals.reviewed, totals.decided, totals.blocked
    );
    Ok(0)
}

#[cfg(test)]
mod tests {
    use depoline_core::{
        CandidateSource, Decision, DuplicateCandidate, Environment, MigrationRecord,
        ScoreBreakdown, Tier,
    };

    use super::*;

    fn candidate(score: f64, tier: Tier) -> DuplicateCandidate {
        DuplicateCandidate {
            source: CandidateSource::LocalRegistry,
            identifier: Some(format!("ext-{score}")),
            doi: Some("10.1234/abc".into()),
            title: "Coastal erosion lidar survey".into(),
            url: None,
            score,
            breakdown: ScoreBreakdown::default(),
            tier,
            decision: Decision::Unresolved,
        }
    }

    #[test]
    fn accepted_candidates_flag_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path(), Environment::Sandbox, StoreMode::ReadWrite).unwrap();

        let mut strong = MigrationRecord::new("strong");
        strong.status = RecordStatus::Transformed;
        strong.candidates = vec![candidate(0.97, Tier::HighConfidence)];
        store.put(strong).unwrap();

        let mut weak = MigrationRecord::new("weak");
        weak.status = RecordStatus::Transformed;
        weak.candidates = vec![candidate(0.80, Tier::Review)];
        store.put(weak).unwrap();

        store.put(MigrationRecord::new("none")).unwrap();

        let totals = review(&store, &ThresholdCurator { threshold: 0.90 }, None).unwrap();
        assert_eq!(
            totals,
            ReviewTotals {
                reviewed: 2,
                decided: 2,
                blocked: 1,
            }
        );

        let strong = store.get("strong").unwrap();
        assert_eq!(strong.status, RecordStatus::DuplicateFlagged);
        assert_eq!(strong.candidates[0].decision, Decision::Accepted);
        let weak = store.get("weak").unwrap();
        assert_eq!(weak.status, RecordStatus::Transformed);
        assert_eq!(weak.candidates[0].decision, Decision::Deferred);
    }

    #[test]
    fn limit_caps_reviewed_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path(), Environment::Sandbox, StoreMode::ReadWrite).unwrap();
        for id in ["a", "b", "c"] {
            let mut r = MigrationRecord::new(id);
            r.status = RecordStatus::Transformed;
            r.candidates = vec![candidate(0.95, Tier::HighConfidence)];
            store.put(r).unwrap();
        }
        let totals = review(&store, &ThresholdCurator { threshold: 0.90 }, Some(2)).unwrap();
        assert_eq!(totals.reviewed, 2);
    }
}
