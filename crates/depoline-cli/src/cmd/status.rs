//! `depoline status` - checkpoint and per-status record counts

use anyhow::Result;
use clap::Args;
use comfy_table::{Cell, Color};
use depoline_store::{OutcomeStatus, PipelineCheckpoint, StateStore, Step, StepState, StoreMode};

use super::TargetArgs;
use crate::config::Config;

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub target: TargetArgs,
}

fn state_cell(state: StepState) -> Cell {
    match state {
        StepState::NotStarted => Cell::new("not started").fg(Color::DarkGrey),
        StepState::InProgress => Cell::new("in progress").fg(Color::Yellow),
        StepState::Completed => Cell::new("completed").fg(Color::Green),
        StepState::Skipped => Cell::new("skipped").fg(Color::DarkGrey),
        StepState::Failed => Cell::new("failed").fg(Color::Red),
    }
}

pub fn run(args: StatusArgs, config: &Config) -> Result<u8> {
    let environment = args.target.environment();
    let output = args.target.output_dir(config);
    let store = StateStore::open(&output, environment, StoreMode::ReadOnly)?;

    eprintln!("\nEnvironment: {environment}");
    eprintln!("State:       {}", store.paths().state_dir().display());

    let mut counts = super::table(&["Status", "Records"]);
    for (status, n) in store.status_counts() {
        counts.add_row(vec![Cell::new(status), Cell::new(n)]);
    }
    counts.add_row(vec![
        Cell::new("total").fg(Color::Cyan),
        Cell::new(store.len()).fg(Color::Cyan),
    ]);
    eprintln!("{counts}");

    let outcomes = store.outcomes()?;
    if !outcomes.is_empty() {
        let tally = |s: OutcomeStatus| outcomes.iter().filter(|o| o.status == s).count();
        eprintln!(
            "Upload outcomes: {} success, {} failed, {} skipped",
            tally(OutcomeStatus::Success),
            tally(OutcomeStatus::Failed),
            tally(OutcomeStatus::Skipped)
        );
    }

    match store.load_checkpoint()? {
        Some(checkpoint) => print_checkpoint(&checkpoint),
        None => eprintln!("No checkpoint."),
    }
    Ok(0)
}

fn print_checkpoint(checkpoint: &PipelineCheckpoint) {
    let mut steps = super::table(&["Step", "State"]);
    for step in Step::ALL {
        steps.add_row(vec![Cell::new(step), state_cell(checkpoint.state(step))]);
    }
    eprintln!(
        "\nCheckpoint started {}, updated {}",
        checkpoint.start_time.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S"),
        checkpoint.updated_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S"),
    );
    eprintln!("{steps}");
    match checkpoint.next_step() {
        Some(step) => eprintln!("Next step: {step} (run with --resume)"),
        None => eprintln!("All steps done."),
    }
    for error in &checkpoint.errors {
        eprintln!("  error: {error}");
    }
    if !checkpoint.warnings.is_empty() {
        eprintln!("{} warning(s):", checkpoint.warnings.len());
        for warning in checkpoint.warnings.iter().rev().take(5) {
            eprintln!("  {warning}");
        }
    }
}

#[cfg(test)]
mod tests {
    use depoline_core::{Environment, MigrationRecord, RecordStatus};

    use super::*;

    #[test]
    fn status_reads_without_locking_or_writing() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("output");
        {
            let store =
                StateStore::open(&output, Environment::Sandbox, StoreMode::ReadWrite).unwrap();
            let mut record = MigrationRecord::new("a");
            record.status = RecordStatus::Failed;
            store.put(record).unwrap();
        }
        // A live writer's lock does not block a status read.
        let _writer =
            StateStore::open(&output, Environment::Sandbox, StoreMode::ReadWrite).unwrap();

        let args = StatusArgs {
            target: TargetArgs {
                output_dir: Some(output),
                ..TargetArgs::default()
            },
        };
        assert_eq!(run(args, &Config::default()).unwrap(), 0);
    }
}
