//! `depoline run` - the six-step migration

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::{Cell, Color};
use depoline_core::{CatalogClient, SharedProgress, global_stop};
use depoline_fgdc::{CrosswalkOptions, FgdcTransformer};
use depoline_matching::{
    AdapterConfig, CROSSREF_URL, CrossrefAdapter, DATACITE_URL, DataCiteAdapter, RegistryAdapter,
};
use depoline_pipeline::{
    Curator, Disposition, MatchingSetup, Orchestrator, PipelineConfig, RunReport,
    TerminalCurator, TerminalPrompt, ThresholdCurator,
};
use depoline_store::{StateStore, Step, StoreMode};
use depoline_zenodo::ZenodoClient;

use super::TargetArgs;
use crate::config::Config;

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Records per upload batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Process at most N source records
    #[arg(long)]
    pub limit: Option<usize>,

    /// Number of parallel upload workers
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Pause before each step and after each upload batch
    #[arg(long)]
    pub interactive: bool,

    /// Report what would happen without writing state or calling the API
    #[arg(long)]
    pub dry_run: bool,

    /// Continue from the saved checkpoint
    #[arg(long, conflicts_with = "fresh")]
    pub resume: bool,

    /// Archive the saved checkpoint and start over
    #[arg(long)]
    pub fresh: bool,

    /// Stop after the first step with failed records
    #[arg(long)]
    pub abort_on_failure: bool,

    #[arg(long)]
    pub skip_transform: bool,
    #[arg(long)]
    pub skip_duplicates: bool,
    #[arg(long)]
    pub skip_upload: bool,
    #[arg(long)]
    pub skip_audit: bool,
    #[arg(long)]
    pub skip_verify: bool,
    #[arg(long)]
    pub skip_publish: bool,

    /// Directory of FGDC XML records
    #[arg(long)]
    pub source_dir: Option<PathBuf>,

    /// Accept duplicate candidates at or above the auto-accept threshold
    #[arg(long)]
    pub auto_accept: bool,
}

impl RunArgs {
    fn skipped_steps(&self) -> Vec<Step> {
        [
            (self.skip_transform, Step::Transform),
            (self.skip_duplicates, Step::DuplicateCheck),
            (self.skip_upload, Step::Upload),
            (self.skip_audit, Step::Audit),
            (self.skip_verify, Step::Verify),
            (self.skip_publish, Step::Publish),
        ]
        .into_iter()
        .filter_map(|(skip, step)| skip.then_some(step))
        .collect()
    }
}

/// Merge flags over file settings. Flags win.
pub fn pipeline_config(args: &RunArgs, config: &Config) -> Result<PipelineConfig> {
    let requested = args.workers.unwrap_or(config.workers.default);
    let workers = requested.clamp(1, config.workers.max.max(1));
    if workers != requested {
        log::warn!("workers clamped to {workers} (max {})", config.workers.max);
    }
    let matching = config
        .matching
        .clone()
        .validated()
        .map_err(anyhow::Error::msg)
        .context("invalid [matching] settings")?;

    Ok(PipelineConfig {
        environment: args.target.environment(),
        source_dir: args
            .source_dir
            .clone()
            .unwrap_or_else(|| config.pipeline.source_dir.clone()),
        output_dir: args.target.output_dir(config),
        batch_size: args.batch_size.unwrap_or(config.pipeline.batch_size),
        limit: args.limit,
        workers,
        interactive: args.interactive,
        dry_run: args.dry_run,
        resume: args.resume,
        fresh: args.fresh,
        abort_on_failure: args.abort_on_failure || config.pipeline.abort_on_failure,
        skip: args.skipped_steps(),
        rate_limit: config.rate_limit.to_config(),
        retry: config.retry.to_policy(),
        matching,
        auto_accept_threshold: config.pipeline.auto_accept_threshold,
        allow_production_publish: config.pipeline.allow_production_publish,
    })
}

fn registry_adapters(config: &Config) -> Vec<Box<dyn RegistryAdapter>> {
    let registries = &config.registries;
    let mut adapters: Vec<Box<dyn RegistryAdapter>> = Vec::new();
    if registries.crossref {
        adapters.push(Box::new(CrossrefAdapter::new(
            AdapterConfig {
                base_url: CROSSREF_URL.to_string(),
                rows: registries.rows,
                pause: Duration::from_secs(1),
            },
            registries.mailto.clone(),
        )));
    }
    if registries.datacite {
        adapters.push(Box::new(DataCiteAdapter::new(AdapterConfig {
            base_url: DATACITE_URL.to_string(),
            rows: registries.rows,
            pause: Duration::from_secs(1),
        })));
    }
    adapters
}

pub fn run(args: RunArgs, config: &Config, progress: &SharedProgress) -> Result<u8> {
    let pipeline = pipeline_config(&args, config)?;
    pipeline.validate()?;
    let environment = pipeline.environment;

    // Fail before touching any record when the token is missing. Dry runs
    // only use a client for destination search, and only when a token is set.
    let client: Option<Arc<dyn CatalogClient>> = if pipeline.dry_run {
        log::info!("dry run: no uploads or publishes, no state written");
        match ZenodoClient::from_env(environment) {
            Ok(client) if config.registries.search_destination => Some(Arc::new(client)),
            Ok(_) => None,
            Err(e) => {
                log::debug!("dry run without a catalog client: {e:#}");
                None
            }
        }
    } else {
        let client = ZenodoClient::from_env(environment)
            .with_context(|| format!("cannot run against {environment}"))?;
        Some(Arc::new(client))
    };

    let mode = if pipeline.dry_run {
        StoreMode::DryRun
    } else {
        StoreMode::ReadWrite
    };
    let store = StateStore::open(&pipeline.output_dir, environment, mode)?;

    let transformer = FgdcTransformer::new(CrosswalkOptions {
        community: config.zenodo.community.clone(),
        publisher_note: config.zenodo.publisher_note.clone(),
    });
    let matching = MatchingSetup {
        registry_files: config.registries.files.clone(),
        adapters: registry_adapters(config),
        search_destination: config.registries.search_destination,
    };
    let curator: Option<Box<dyn Curator>> = if args.auto_accept {
        Some(Box::new(ThresholdCurator {
            threshold: pipeline.auto_accept_threshold,
        }))
    } else if pipeline.interactive {
        Some(Box::new(TerminalCurator))
    } else {
        None
    };
    let interactive = pipeline.interactive;

    log::info!(
        "depoline run: {environment}, source {}, output {}",
        pipeline.source_dir.display(),
        pipeline.output_dir.display()
    );

    let mut orchestrator = Orchestrator::new(pipeline, store, Box::new(transformer))
        .with_matching(matching)
        .with_stop(global_stop())
        .with_progress(progress.clone());
    if let Some(client) = client {
        orchestrator = orchestrator.with_client(client);
    }
    if let Some(curator) = curator {
        orchestrator = orchestrator.with_curator(curator);
    }
    if interactive {
        let bars = progress.clone();
        orchestrator = orchestrator.with_prompt(Box::new(TerminalPrompt::new(move |ask| {
            bars.suspend(|| ask())
        })));
    }

    let report = orchestrator.run()?;
    print_summary(&report);
    Ok(report.exit_code())
}

fn disposition_cell(disposition: &Disposition) -> Cell {
    let cell = Cell::new(disposition);
    match disposition {
        Disposition::Completed | Disposition::AlreadyDone => cell.fg(Color::Green),
        Disposition::Skipped(_) | Disposition::NotReached => cell.fg(Color::DarkGrey),
        Disposition::Interrupted => cell.fg(Color::Yellow),
        Disposition::Aborted => cell.fg(Color::Red),
    }
}

fn print_summary(report: &RunReport) {
    let mut table = super::table(&["Step", "Result", "Succeeded", "Failed", "Skipped"]);
    for step in &report.steps {
        let failed = Cell::new(step.summary.failed);
        table.add_row(vec![
            Cell::new(step.step),
            disposition_cell(&step.disposition),
            Cell::new(step.summary.succeeded),
            if step.summary.failed > 0 {
                failed.fg(Color::Red)
            } else {
                failed
            },
            Cell::new(step.summary.skipped),
        ]);
    }

    let mode = if report.dry_run { " (dry run)" } else { "" };
    eprintln!("\nMigration summary: {}{mode}", report.environment);
    eprintln!("{table}");
    if !report.dry_run {
        eprintln!("Checkpoint: {}", report.checkpoint_path.display());
    }
    for path in &report.reports {
        eprintln!("Report:     {}", path.display());
    }
    match report.exit_code() {
        2 => eprintln!("Interrupted. Re-run with --resume to continue."),
        3 => eprintln!(
            "{} record(s) failed. Inspect with `depoline status`, reset with `depoline retry`.",
            report.failed_records()
        ),
        _ => {}
    }
}
