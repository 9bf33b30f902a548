//! Run settings assembled by the CLI from flags and `depoline.toml`

use std::path::PathBuf;

use depoline_core::{Environment, RateLimitConfig, RetryPolicy};
use depoline_matching::MatchingConfig;
use depoline_store::Step;
use serde_json::json;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub environment: Environment,
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Records per upload batch (checkpoint + prompt boundary).
    pub batch_size: usize,
    /// Process at most this many source records.
    pub limit: Option<usize>,
    pub workers: usize,
    pub interactive: bool,
    pub dry_run: bool,
    pub resume: bool,
    pub fresh: bool,
    pub abort_on_failure: bool,
    pub skip: Vec<Step>,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryPolicy,
    pub matching: MatchingConfig,
    /// Score at or above which the automatic curator accepts a candidate.
    pub auto_accept_threshold: f64,
    pub allow_production_publish: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Sandbox,
            source_dir: PathBuf::from("fgdc"),
            output_dir: PathBuf::from("output"),
            batch_size: 50,
            limit: None,
            workers: 1,
            interactive: false,
            dry_run: false,
            resume: false,
            fresh: false,
            abort_on_failure: false,
            skip: Vec::new(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryPolicy::default(),
            matching: MatchingConfig::default(),
            auto_accept_threshold: 0.90,
            allow_production_publish: false,
        }
    }
}

impl PipelineConfig {
    pub fn skips(&self, step: Step) -> bool {
        self.skip.contains(&step)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.batch_size > 0, "batch size must be at least 1");
        anyhow::ensure!(self.workers > 0, "workers must be at least 1");
        anyhow::ensure!(
            !(self.resume && self.fresh),
            "--resume and --fresh are mutually exclusive"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.auto_accept_threshold),
            "auto-accept threshold must be within [0, 1]"
        );
        Ok(())
    }

    /// Settings recorded in the checkpoint for later inspection.
    pub fn snapshot(&self) -> serde_json::Value {
        json!({
            "environment": self.environment.as_str(),
            "sourceDir": self.source_dir.display().to_string(),
            "outputDir": self.output_dir.display().to_string(),
            "batchSize": self.batch_size,
            "limit": self.limit,
            "workers": self.workers,
            "interactive": self.interactive,
            "abortOnFailure": self.abort_on_failure,
            "skip": self.skip.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            "rateLimit": {
                "perMinute": self.rate_limit.per_minute,
                "perHour": self.rate_limit.per_hour,
                "minIntervalMs": self.rate_limit.min_interval.as_millis() as u64,
            },
            "retry": {
                "maxRetries": self.retry.max_retries,
                "baseDelayMs": self.retry.base_delay.as_millis() as u64,
            },
            "matching": self.matching,
        })
    }
}
