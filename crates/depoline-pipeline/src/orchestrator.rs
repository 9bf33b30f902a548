//! Drives the six steps in order with checkpointing, skips and pause points

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use depoline_core::{
    CatalogClient, RateLimiter, RecordStatus, SharedProgress, StopFlag, Transformer, fmt_duration,
};
use depoline_store::{PipelineCheckpoint, StateStore, Step, StepState, StoreMode};

use crate::config::PipelineConfig;
use crate::curator::Curator;
use crate::prompt::{AutoContinue, PausePoint, Prompt, PromptAnswer};
use crate::reporter::{LogReporter, Reporter};
use crate::steps::duplicates::MatchingSetup;
use crate::steps::{self, StepContext, StepRun};
use crate::summary::{Disposition, RunReport, StepReport, StepSummary};

pub struct Orchestrator {
    config: PipelineConfig,
    store: StateStore,
    transformer: Box<dyn Transformer>,
    client: Option<Arc<dyn CatalogClient>>,
    limiter: Arc<RateLimiter>,
    matching: MatchingSetup,
    curator: Option<Box<dyn Curator>>,
    prompt: Box<dyn Prompt>,
    reporter: Box<dyn Reporter>,
    stop: StopFlag,
    progress: SharedProgress,
}

impl Orchestrator {
    pub fn new(config: PipelineConfig, store: StateStore, transformer: Box<dyn Transformer>) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.rate_limit));
        Self {
            config,
            store,
            transformer,
            client: None,
            limiter,
            matching: MatchingSetup::default(),
            curator: None,
            prompt: Box::new(AutoContinue),
            reporter: Box::new(LogReporter),
            stop: StopFlag::new(),
            progress: Arc::new(depoline_core::ProgressContext::hidden()),
        }
    }

    pub fn with_client(mut self, client: Arc<dyn CatalogClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Replace the limiter built from the config (tests inject a manual clock).
    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_matching(mut self, matching: MatchingSetup) -> Self {
        self.matching = matching;
        self
    }

    pub fn with_curator(mut self, curator: Box<dyn Curator>) -> Self {
        self.curator = Some(curator);
        self
    }

    pub fn with_prompt(mut self, prompt: Box<dyn Prompt>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_reporter(mut self, reporter: Box<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_stop(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_progress(mut self, progress: SharedProgress) -> Self {
        self.progress = progress;
        self
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&mut self) -> Result<RunReport> {
        self.config.validate()?;
        anyhow::ensure!(
            self.config.dry_run || self.client.is_some(),
            "a catalog client is required unless running with --dry-run"
        );
        anyhow::ensure!(
            self.config.dry_run == (self.store.mode() == StoreMode::DryRun),
            "dry runs need a dry-run store, and only dry runs may use one"
        );

        let mut checkpoint = self.prepare_checkpoint()?;
        let mut needs_resume_check = !checkpoint.steps_completed.is_empty();
        let mut steps = Vec::with_capacity(Step::ALL.len());
        let mut reports = Vec::new();
        let mut halted = false;

        for step in Step::ALL {
            let report = |disposition: Disposition| StepReport {
                step,
                disposition,
                summary: StepSummary::default(),
            };
            if halted {
                steps.push(report(Disposition::NotReached));
                continue;
            }
            if matches!(checkpoint.state(step), StepState::Completed | StepState::Skipped) {
                steps.push(report(Disposition::AlreadyDone));
                continue;
            }
            if self.stop.is_requested() {
                steps.push(report(Disposition::Interrupted));
                halted = true;
                continue;
            }
            if self.config.skips(step) {
                log::info!("{step}: skipped (--skip)");
                checkpoint.mark_skipped(step)?;
                self.save(&checkpoint)?;
                steps.push(report(Disposition::Skipped("--skip".into())));
                continue;
            }
            if self.config.interactive {
                let answer = self
                    .progress
                    .suspend(|| self.prompt.ask(PausePoint::BeforeStep(step)));
                match answer {
                    PromptAnswer::Continue => {}
                    PromptAnswer::Skip => {
                        log::info!("{step}: skipped at the prompt");
                        checkpoint.mark_skipped(step)?;
                        self.save(&checkpoint)?;
                        steps.push(report(Disposition::Skipped("prompt".into())));
                        continue;
                    }
                    PromptAnswer::Stop => {
                        self.stop.request();
                        steps.push(report(Disposition::Interrupted));
                        halted = true;
                        continue;
                    }
                }
            }
            if needs_resume_check {
                needs_resume_check = false;
                for problem in self.check_resume_state()? {
                    log::warn!("resume check: {problem}");
                    checkpoint.warn(format!("resume check: {problem}"));
                }
            }

            checkpoint.begin(step)?;
            self.save(&checkpoint)?;
            let stage = self.progress.stage_line(step.as_str());
            let started = Instant::now();
            let run = match self.run_step(step) {
                Ok(run) => run,
                Err(e) => {
                    stage.finish_and_clear();
                    checkpoint.mark_failed(step, format!("{e:#}"));
                    self.save(&checkpoint)?;
                    return Err(e.context(format!("step {step} failed")));
                }
            };
            stage.finish_and_clear();

            for warning in &run.warnings {
                checkpoint.warn(warning.clone());
            }
            reports.extend(run.report.clone());
            let disposition = if let Some(reason) = run.declined {
                log::warn!("{step}: {reason}");
                checkpoint.warn(format!("{step}: {reason}"));
                checkpoint.mark_skipped(step)?;
                Disposition::Skipped(reason)
            } else if run.interrupted {
                Disposition::Interrupted
            } else if self.config.abort_on_failure && run.summary.failed > 0 {
                checkpoint.mark_failed(step, format!("{} record(s) failed", run.summary.failed));
                Disposition::Aborted
            } else {
                checkpoint.mark_completed(step)?;
                Disposition::Completed
            };
            self.save(&checkpoint)?;
            self.reporter.step_finished(step, &run.summary);
            log::info!("{step}: {disposition} in {}", fmt_duration(started.elapsed()));

            halted = matches!(disposition, Disposition::Interrupted | Disposition::Aborted);
            steps.push(StepReport {
                step,
                disposition,
                summary: run.summary,
            });
        }

        Ok(RunReport {
            environment: self.config.environment,
            dry_run: self.config.dry_run,
            steps,
            checkpoint_path: self.store.paths().checkpoint(),
            reports,
        })
    }

    fn run_step(&mut self, step: Step) -> Result<StepRun> {
        let matching = if step == Step::DuplicateCheck {
            std::mem::take(&mut self.matching)
        } else {
            MatchingSetup::default()
        };
        let ctx = StepContext {
            config: &self.config,
            store: &self.store,
            client: self.client.clone(),
            limiter: self.limiter.clone(),
            stop: &self.stop,
            progress: self.progress.as_ref(),
            reporter: self.reporter.as_ref(),
            prompt: self.prompt.as_ref(),
        };
        match step {
            Step::Transform => steps::transform::run(&ctx, self.transformer.as_ref()),
            Step::DuplicateCheck => steps::duplicates::run(&ctx, matching, self.curator.as_deref()),
            Step::Upload => steps::upload::run(&ctx),
            Step::Audit => steps::audit::run(&ctx),
            Step::Verify => steps::verify::run(&ctx),
            Step::Publish => steps::publish::run(&ctx),
        }
    }

    /// Checkpoint to run against: a new one, or the saved one with `--resume`.
    fn prepare_checkpoint(&self) -> Result<PipelineCheckpoint> {
        let fresh = PipelineCheckpoint::new(self.config.environment, self.config.snapshot());
        if self.config.fresh {
            if !self.config.dry_run {
                if let Some(archived) = self.store.archive_checkpoint()? {
                    log::info!("previous checkpoint archived to {}", archived.display());
                }
            }
            return Ok(fresh);
        }

        let path = self.store.paths().checkpoint();
        let existing = self.store.load_checkpoint().with_context(|| {
            format!(
                "checkpoint {} is unreadable; repair it or start over with --fresh",
                path.display()
            )
        })?;
        match existing {
            Some(checkpoint) if self.config.resume => {
                anyhow::ensure!(
                    checkpoint.environment == self.config.environment,
                    "checkpoint {} belongs to the {} environment",
                    path.display(),
                    checkpoint.environment
                );
                match checkpoint.next_step() {
                    Some(step) => log::info!("resuming at step {step}"),
                    None => log::info!("checkpoint is complete, nothing to resume"),
                }
                Ok(checkpoint)
            }
            Some(_) => anyhow::bail!(
                "a checkpoint already exists at {}; pass --resume to continue or --fresh to start over",
                path.display()
            ),
            None => {
                if self.config.resume {
                    log::info!("no checkpoint found, starting from the first step");
                }
                Ok(fresh)
            }
        }
    }

    /// Verify what earlier steps produced before continuing from a checkpoint.
    /// Affected records are failed; the problems are returned for the checkpoint.
    fn check_resume_state(&self) -> Result<Vec<String>> {
        let mut problems = Vec::new();
        for mut record in self.store.records() {
            let problem = if matches!(
                record.status,
                RecordStatus::Transformed | RecordStatus::DuplicateFlagged
            ) {
                match &record.payload {
                    None => Some("payload missing".to_string()),
                    Some(r) => match self.store.verify_payload(r) {
                        Ok(true) => None,
                        Ok(false) => Some("payload file does not match its hash".to_string()),
                        Err(e) => Some(format!("payload unreadable: {e:#}")),
                    },
                }
            } else if record.status.is_uploaded() && record.remote_id.is_none() {
                Some("uploaded without remote id".to_string())
            } else {
                None
            };

            if let Some(problem) = problem {
                problems.push(format!("{}: {problem}", record.id));
                record.fail(format!("resume check: {problem}"));
                self.store.put(record)?;
            }
        }
        Ok(problems)
    }

    fn save(&self, checkpoint: &PipelineCheckpoint) -> Result<()> {
        if self.config.dry_run {
            return Ok(());
        }
        self.store.save_checkpoint(checkpoint)
    }
}
