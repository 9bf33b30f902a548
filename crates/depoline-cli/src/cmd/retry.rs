//! `depoline retry` - return failed records to a retryable status

use anyhow::Result;
use clap::Args;
use comfy_table::Cell;
use depoline_core::RecordStatus;
use depoline_store::{StateStore, StoreMode};

use super::TargetArgs;
use crate::config::Config;

#[derive(Args, Debug, Default)]
pub struct RetryArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Only reset these record ids (repeatable)
    #[arg(long = "id")]
    pub ids: Vec<String>,
}

/// Reset failed records. Returns `(id, previous error, new status)` per record.
fn reset_failed(
    store: &StateStore,
    only: &[String],
) -> Result<Vec<(String, Option<String>, RecordStatus)>> {
    let ids = store.ids_where(|r| {
        r.status == RecordStatus::Failed && (only.is_empty() || only.contains(&r.id))
    });
    let mut reset = Vec::with_capacity(ids.len());
    for id in ids {
        let Some(mut record) = store.get(&id) else {
            continue;
        };
        let error = record.last_error.clone();
        if record.retry() {
            let status = record.status;
            store.put(record)?;
            reset.push((id, error, status));
        }
    }
    Ok(reset)
}

pub fn run(args: RetryArgs, config: &Config) -> Result<u8> {
    let output = args.target.output_dir(config);
    let store = StateStore::open(&output, args.target.environment(), StoreMode::ReadWrite)?;

    let reset = reset_failed(&store, &args.ids)?;
    if reset.is_empty() {
        eprintln!("No failed records.");
        return Ok(0);
    }

    let mut table = super::table(&["Record", "Now", "Last error"]);
    for (id, error, status) in &reset {
        table.add_row(vec![
            Cell::new(id),
            Cell::new(status),
            Cell::new(error.as_deref().unwrap_or("-")),
        ]);
    }
    eprintln!("\n{table}");
    eprintln!("{} record(s) reset; the next run retries them.", reset.len());
    Ok(0)
}
