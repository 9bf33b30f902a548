//! Subcommands

pub mod retry;
pub mod review;
pub mod run;
pub mod status;

use std::path::PathBuf;

use clap::Args;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use depoline_core::Environment;

use crate::config::Config;

/// Environment and state location, shared by every command that opens the store.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Target the Zenodo sandbox (default)
    #[arg(long)]
    pub sandbox: bool,

    /// Target production Zenodo (wins over --sandbox)
    #[arg(long)]
    pub production: bool,

    /// Output directory holding state, payloads and reports
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

impl TargetArgs {
    pub fn environment(&self) -> Environment {
        Environment::from_flags(self.production)
    }

    pub fn output_dir(&self, config: &Config) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| config.output.dir.clone())
    }
}

/// Table with the shared preset and cyan headers.
pub fn table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).fg(Color::Cyan))
                .collect::<Vec<_>>(),
        );
    table
}

fn set_or_not(value: bool) -> &'static str {
    if value { "configured" } else { "not set" }
}

pub fn show_config(config: &Config) {
    let mut table = table(&["Setting", "Value"]);

    table.add_row(vec![
        "Output directory",
        &config.output.dir.display().to_string(),
    ]);
    table.add_row(vec![
        "Source directory",
        &config.pipeline.source_dir.display().to_string(),
    ]);
    table.add_row(vec!["Batch size", &config.pipeline.batch_size.to_string()]);
    table.add_row(vec![
        "Workers",
        &format!("{} (max: {})", config.workers.default, config.workers.max),
    ]);
    table.add_row(vec![
        "Rate limit",
        &format!(
            "{}/min, {}/h, {}ms spacing",
            config.rate_limit.per_minute, config.rate_limit.per_hour, config.rate_limit.min_interval_ms
        ),
    ]);
    table.add_row(vec![
        "Retries",
        &format!(
            "{} (base {}ms x{}, max {}s)",
            config.retry.max_retries,
            config.retry.base_delay_ms,
            config.retry.factor,
            config.retry.max_delay_secs
        ),
    ]);
    table.add_row(vec![
        "Match thresholds",
        &format!(
            "high {:.2}, review {:.2}",
            config.matching.high_confidence, config.matching.review
        ),
    ]);
    let w = &config.matching.weights;
    table.add_row(vec![
        "Match weights",
        &format!(
            "title {:.2}, abstract {:.2}, creators {:.2}",
            w.title, w.abstract_text, w.creators
        ),
    ]);
    table.add_row(vec![
        "Auto-accept threshold",
        &format!("{:.2}", config.pipeline.auto_accept_threshold),
    ]);
    let mut registries = vec![format!("{} file(s)", config.registries.files.len())];
    if config.registries.search_destination {
        registries.push("zenodo".into());
    }
    if config.registries.crossref {
        registries.push("crossref".into());
    }
    if config.registries.datacite {
        registries.push("datacite".into());
    }
    table.add_row(vec!["Registries", &registries.join(", ")]);
    table.add_row(vec![
        "Community",
        config.zenodo.community.as_deref().unwrap_or("none"),
    ]);
    table.add_row(vec![
        "Request timeout",
        &format!("{}s", config.zenodo.request_timeout),
    ]);
    table.add_row(vec![
        "Production publish",
        if config.pipeline.allow_production_publish {
            "allowed"
        } else {
            "disabled"
        },
    ]);
    for env in [Environment::Sandbox, Environment::Production] {
        let var = env.token_var();
        let present = std::env::var(var).is_ok_and(|t| !t.trim().is_empty());
        table.add_row(vec![var, set_or_not(present)]);
    }

    eprintln!("\n{table}");
}
