//! Per-step and per-run outcome summaries

use std::path::PathBuf;

use depoline_core::Environment;
use depoline_store::Step;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl StepSummary {
    pub fn add(&mut self, other: StepSummary) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

/// How a step ended in this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Completed or skipped by an earlier run.
    AlreadyDone,
    Completed,
    /// Skipped by flag, prompt, or policy (reason).
    Skipped(String),
    /// Stopped mid-step; resume continues here.
    Interrupted,
    /// `abort_on_failure` stopped the run after this step.
    Aborted,
    NotReached,
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyDone => f.write_str("already done"),
            Self::Completed => f.write_str("completed"),
            Self::Skipped(reason) => write!(f, "skipped ({reason})"),
            Self::Interrupted => f.write_str("interrupted"),
            Self::Aborted => f.write_str("aborted"),
            Self::NotReached => f.write_str("not reached"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepReport {
    pub step: Step,
    pub disposition: Disposition,
    pub summary: StepSummary,
}

/// Result of one orchestrator run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub environment: Environment,
    pub dry_run: bool,
    pub steps: Vec<StepReport>,
    pub checkpoint_path: PathBuf,
    /// Audit and verification reports written during the run.
    pub reports: Vec<PathBuf>,
}

impl RunReport {
    pub fn interrupted(&self) -> bool {
        self.steps
            .iter()
            .any(|s| s.disposition == Disposition::Interrupted)
    }

    pub fn aborted(&self) -> bool {
        self.steps.iter().any(|s| s.disposition == Disposition::Aborted)
    }

    pub fn failed_records(&self) -> usize {
        self.steps.iter().map(|s| s.summary.failed).sum()
    }

    pub fn step(&self, step: Step) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.step == step)
    }

    /// 0 success, 2 interrupted, 3 record failures or abort.
    pub fn exit_code(&self) -> u8 {
        if self.interrupted() {
            2
        } else if self.aborted() || self.failed_records() > 0 {
            3
        } else {
            0
        }
    }
}
