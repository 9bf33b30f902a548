//! The six pipeline steps

pub mod audit;
pub mod duplicates;
pub mod publish;
pub mod transform;
pub mod upload;
pub mod verify;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use depoline_core::{CatalogClient, ProgressContext, RateLimiter, StopFlag};
use depoline_store::StateStore;

use crate::config::PipelineConfig;
use crate::prompt::Prompt;
use crate::reporter::Reporter;
use crate::summary::StepSummary;

/// Everything a step may touch.
pub struct StepContext<'a> {
    pub config: &'a PipelineConfig,
    pub store: &'a StateStore,
    /// `None` only in dry runs.
    pub client: Option<Arc<dyn CatalogClient>>,
    pub limiter: Arc<RateLimiter>,
    pub stop: &'a StopFlag,
    pub progress: &'a ProgressContext,
    pub reporter: &'a dyn Reporter,
    pub prompt: &'a dyn Prompt,
}

impl StepContext<'_> {
    pub fn dry_run(&self) -> bool {
        self.config.dry_run
    }

    pub fn client(&self) -> Result<&dyn CatalogClient> {
        match &self.client {
            Some(c) => Ok(c.as_ref()),
            None => anyhow::bail!("no catalog client configured"),
        }
    }
}

/// What one step did. In dry runs the counts are what a real run would do.
#[derive(Debug, Default)]
pub struct StepRun {
    pub summary: StepSummary,
    pub interrupted: bool,
    /// Step declined to run (policy), with the reason.
    pub declined: Option<String>,
    pub report: Option<PathBuf>,
    /// Messages to record in the checkpoint.
    pub warnings: Vec<String>,
}

impl StepRun {
    pub fn counts(summary: StepSummary) -> Self {
        Self {
            summary,
            ..Self::default()
        }
    }

    pub fn declined(reason: impl Into<String>) -> Self {
        Self {
            declined: Some(reason.into()),
            ..Self::default()
        }
    }
}
