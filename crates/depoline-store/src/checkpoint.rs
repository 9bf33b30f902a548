//! Pipeline checkpoint: which steps are done for one environment

use std::path::Path;

use anyhow::{Context, Result, bail, ensure};
use chrono::{DateTime, Utc};
use depoline_core::Environment;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::atomic;

/// Bump when the checkpoint layout changes incompatibly.
pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;

/// Pipeline steps in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Transform,
    DuplicateCheck,
    Upload,
    Audit,
    Verify,
    Publish,
}

impl Step {
    pub const ALL: [Self; 6] = [
        Self::Transform,
        Self::DuplicateCheck,
        Self::Upload,
        Self::Audit,
        Self::Verify,
        Self::Publish,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transform => "transform",
            Self::DuplicateCheck => "duplicate_check",
            Self::Upload => "upload",
            Self::Audit => "audit",
            Self::Verify => "verify",
            Self::Publish => "publish",
        }
    }

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|s| *s == self).unwrap_or(0)
    }

    fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|step| step.as_str() == s)
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry in `stepsCompleted`: `"<step>"` or `"<step>_skipped"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEntry {
    Completed(Step),
    Skipped(Step),
}

impl StepEntry {
    pub fn step(self) -> Step {
        match self {
            Self::Completed(s) | Self::Skipped(s) => s,
        }
    }
}

impl Serialize for StepEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Completed(s) => serializer.serialize_str(s.as_str()),
            Self::Skipped(s) => serializer.collect_str(&format_args!("{s}_skipped")),
        }
    }
}

impl<'de> Deserialize<'de> for StepEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let entry = match raw.strip_suffix("_skipped") {
            Some(name) => Step::parse(name).map(Self::Skipped),
            None => Step::parse(&raw).map(Self::Completed),
        };
        entry.ok_or_else(|| serde::de::Error::custom(format!("unknown step entry: {raw}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    NotStarted,
    InProgress,
    Completed,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineCheckpoint {
    pub format_version: u32,
    pub environment: Environment,
    pub steps_completed: Vec<StepEntry>,
    pub current_step: Option<Step>,
    #[serde(default)]
    pub failed_step: Option<Step>,
    /// Effective run configuration at start, for the audit trail.
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineCheckpoint {
    pub fn new(environment: Environment, config: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            format_version: CHECKPOINT_FORMAT_VERSION,
            environment,
            steps_completed: Vec::new(),
            current_step: None,
            failed_step: None,
            config,
            errors: Vec::new(),
            warnings: Vec::new(),
            start_time: now,
            updated_at: now,
        }
    }

    /// First step not yet completed or skipped.
    pub fn next_step(&self) -> Option<Step> {
        Step::ALL.get(self.steps_completed.len()).copied()
    }

    pub fn is_finished(&self) -> bool {
        self.next_step().is_none()
    }

    pub fn state(&self, step: Step) -> StepState {
        if let Some(entry) = self.steps_completed.iter().find(|e| e.step() == step) {
            return match entry {
                StepEntry::Completed(_) => StepState::Completed,
                StepEntry::Skipped(_) => StepState::Skipped,
            };
        }
        if self.failed_step == Some(step) {
            StepState::Failed
        } else if self.current_step == Some(step) {
            StepState::InProgress
        } else {
            StepState::NotStarted
        }
    }

    pub fn begin(&mut self, step: Step) -> Result<()> {
        self.expect_next(step)?;
        self.current_step = Some(step);
        self.failed_step = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn mark_completed(&mut self, step: Step) -> Result<()> {
        self.push(StepEntry::Completed(step))
    }

    pub fn mark_skipped(&mut self, step: Step) -> Result<()> {
        self.push(StepEntry::Skipped(step))
    }

    pub fn mark_failed(&mut self, step: Step, reason: impl Into<String>) {
        self.failed_step = Some(step);
        self.current_step = None;
        self.errors.push(format!("{step}: {}", reason.into()));
        self.updated_at = Utc::now();
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
        self.updated_at = Utc::now();
    }

    fn push(&mut self, entry: StepEntry) -> Result<()> {
        self.expect_next(entry.step())?;
        self.steps_completed.push(entry);
        self.current_step = None;
        self.failed_step = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// `stepsCompleted` only ever grows by the next canonical step.
    fn expect_next(&self, step: Step) -> Result<()> {
        match self.next_step() {
            Some(next) if next == step => Ok(()),
            Some(next) => bail!("step {step} cannot start before {next}"),
            None => bail!("pipeline already finished; {step} cannot run again"),
        }
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.format_version == CHECKPOINT_FORMAT_VERSION,
            "unsupported checkpoint format version {} (expected {})",
            self.format_version,
            CHECKPOINT_FORMAT_VERSION
        );
        for (entry, expected) in self.steps_completed.iter().zip(Step::ALL) {
            ensure!(
                entry.step() == expected,
                "stepsCompleted out of order: found {} where {expected} was expected",
                entry.step()
            );
        }
        ensure!(
            self.steps_completed.len() <= Step::ALL.len(),
            "stepsCompleted lists more steps than the pipeline has"
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Option<Self>> {
        let json = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()));
            }
        };
        let checkpoint: Self = serde_json::from_str(&json)
            .with_context(|| format!("corrupt checkpoint {}", path.display()))?;
        checkpoint
            .validate()
            .with_context(|| format!("invalid checkpoint {}", path.display()))?;
        Ok(Some(checkpoint))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        atomic::write_json_atomic(path, self)
    }
}
