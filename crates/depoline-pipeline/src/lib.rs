//! depoline-pipeline: the six-step migration run
//!
//! transform -> duplicate_check -> upload -> audit -> verify -> publish,
//! checkpointed after every step and every upload batch.

pub mod config;
pub mod curator;
pub mod orchestrator;
pub mod prompt;
pub mod reporter;
pub mod steps;
pub mod summary;
pub mod uploader;

pub use config::PipelineConfig;
pub use curator::{Curator, TerminalCurator, ThresholdCurator, curate, parse_decision};
pub use orchestrator::Orchestrator;
pub use prompt::{AutoContinue, PausePoint, Prompt, PromptAnswer, TerminalPrompt};
pub use reporter::{LogReporter, Reporter};
pub use steps::audit::{AuditReport, build_report};
pub use steps::duplicates::MatchingSetup;
pub use summary::{Disposition, RunReport, StepReport, StepSummary};
pub use uploader::{BatchOutcome, BatchUploader, Eligibility, eligibility};
