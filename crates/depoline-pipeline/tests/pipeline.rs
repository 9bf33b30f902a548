mod common;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::{
    JsonTransformer, MockCatalog, Workspace, five_sources, instant_limiter, transient, write_sources,
};
use depoline_core::{CallError, Decision, Environment, RecordStatus};
use depoline_pipeline::{
    Disposition, MatchingSetup, Orchestrator, PausePoint, PipelineConfig, Prompt, PromptAnswer,
    RunReport, StepSummary, ThresholdCurator,
};
use depoline_store::{OutcomeStatus, Step};

fn orchestrator(ws: &Workspace, config: PipelineConfig, catalog: &Arc<MockCatalog>) -> Orchestrator {
    let store = ws.open_store(config.environment);
    Orchestrator::new(config, store, Box::new(JsonTransformer))
        .with_client(catalog.clone())
        .with_limiter(instant_limiter())
}

/// Stops the run at the first pause after an upload batch.
struct StopAfterFirstBatch;

impl Prompt for StopAfterFirstBatch {
    fn ask(&self, point: PausePoint) -> PromptAnswer {
        match point {
            PausePoint::AfterBatch { .. } => PromptAnswer::Stop,
            PausePoint::BeforeStep(_) => PromptAnswer::Continue,
        }
    }
}

/// Skips one step when asked before it.
struct SkipStep(Step);

impl Prompt for SkipStep {
    fn ask(&self, point: PausePoint) -> PromptAnswer {
        if point == PausePoint::BeforeStep(self.0) {
            PromptAnswer::Skip
        } else {
            PromptAnswer::Continue
        }
    }
}

#[test]
fn transient_failures_are_retried_within_the_batch() {
    let ws = Workspace::new();
    five_sources(&ws.sources());
    let catalog = MockCatalog::new();
    catalog.fail_next("R3", vec![transient(), transient()]);

    let mut orch = orchestrator(&ws, ws.config(), &catalog);
    let report = orch.run().unwrap();

    let upload = report.step(Step::Upload).unwrap();
    assert_eq!(upload.disposition, Disposition::Completed);
    assert_eq!(upload.summary.succeeded, 5);
    assert_eq!(upload.summary.failed, 0);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(catalog.creates().len(), 5);

    assert_eq!(orch.store().get("R3").unwrap().attempts, 3);
    for record in orch.store().records() {
        assert_eq!(record.status, RecordStatus::Verified, "{}", record.id);
        assert!(record.persistent_identifier.unwrap().starts_with("10.5072/"));
    }

    let outcomes = orch.store().outcomes().unwrap();
    assert_eq!(outcomes.len(), 5);
    assert!(outcomes.iter().all(|o| o.status == OutcomeStatus::Success));
    let r3 = outcomes.iter().find(|o| o.record_id == "R3").unwrap();
    assert_eq!(r3.attempts, 3);
}

#[test]
fn validation_failure_is_isolated_to_its_record() {
    let ws = Workspace::new();
    five_sources(&ws.sources());
    let catalog = MockCatalog::new();
    catalog.fail_next(
        "R2",
        vec![CallError::Validation {
            status: 400,
            message: "metadata.upload_type: required".into(),
        }],
    );

    let mut orch = orchestrator(&ws, ws.config(), &catalog);
    let report = orch.run().unwrap();

    let upload = report.step(Step::Upload).unwrap();
    assert_eq!(upload.summary.succeeded, 4);
    assert_eq!(upload.summary.failed, 1);
    assert_eq!(report.exit_code(), 3);

    let r2 = orch.store().get("R2").unwrap();
    assert_eq!(r2.status, RecordStatus::Failed);
    assert_eq!(r2.attempts, 1);
    assert!(r2.last_error.unwrap().contains("400"));
    assert_eq!(orch.store().get("R5").unwrap().status, RecordStatus::Verified);
    assert_eq!(catalog.publishes().len(), 4);
}

#[test]
fn abort_on_failure_stops_after_the_failing_step() {
    let ws = Workspace::new();
    five_sources(&ws.sources());
    let catalog = MockCatalog::new();
    catalog.fail_next(
        "R1",
        vec![CallError::Validation {
            status: 400,
            message: "bad".into(),
        }],
    );

    let config = PipelineConfig {
        abort_on_failure: true,
        ..ws.config()
    };
    let mut orch = orchestrator(&ws, config, &catalog);
    let report = orch.run().unwrap();

    assert_eq!(report.step(Step::Upload).unwrap().disposition, Disposition::Aborted);
    assert_eq!(report.step(Step::Audit).unwrap().disposition, Disposition::NotReached);
    assert_eq!(report.exit_code(), 3);
    // The first batch [R1, R2] ran; later batches did not.
    assert_eq!(catalog.creates(), ["R2"]);
}

#[test]
fn transform_failure_does_not_stop_the_run() {
    let ws = Workspace::new();
    five_sources(&ws.sources());
    write_sources(&ws.sources(), &[("R6", None)]);
    let catalog = MockCatalog::new();

    let mut orch = orchestrator(&ws, ws.config(), &catalog);
    let report = orch.run().unwrap();

    let transform = report.step(Step::Transform).unwrap();
    assert_eq!(transform.summary.succeeded, 5);
    assert_eq!(transform.summary.failed, 1);
    let r6 = orch.store().get("R6").unwrap();
    assert_eq!(r6.status, RecordStatus::Failed);
    assert_eq!(r6.last_error.as_deref(), Some("transform: missing required field: title"));
    assert_eq!(catalog.creates().len(), 5);
}

#[test]
fn accepted_duplicate_is_not_uploaded() {
    let ws = Workspace::new();
    five_sources(&ws.sources());
    let registry = ws.dir.path().join("registry.json");
    std::fs::write(
        &registry,
        r#"[{"identifier": "ext-1", "doi": "10.1234/abc", "title": "Coastal erosion lidar survey"}]"#,
    )
    .unwrap();
    let catalog = MockCatalog::new();

    let mut orch = orchestrator(&ws, ws.config(), &catalog)
        .with_matching(MatchingSetup {
            registry_files: vec![registry],
            ..MatchingSetup::default()
        })
        .with_curator(Box::new(ThresholdCurator { threshold: 0.90 }));
    let report = orch.run().unwrap();

    let r3 = orch.store().get("R3").unwrap();
    assert_eq!(r3.status, RecordStatus::DuplicateFlagged);
    assert!(r3.remote_id.is_none());
    assert_eq!(r3.candidates[0].decision, Decision::Accepted);
    assert_eq!(r3.candidates[0].doi.as_deref(), Some("10.1234/abc"));

    assert!(!catalog.creates().contains(&"R3".to_string()));
    assert_eq!(catalog.creates().len(), 4);
    assert_eq!(report.step(Step::Upload).unwrap().summary.skipped, 1);
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn resume_after_stop_does_not_duplicate_uploads() {
    let ws = Workspace::new();
    five_sources(&ws.sources());
    let catalog = MockCatalog::new();

    let config = PipelineConfig {
        interactive: true,
        ..ws.config()
    };
    let mut first = orchestrator(&ws, config, &catalog).with_prompt(Box::new(StopAfterFirstBatch));
    let report = first.run().unwrap();
    assert_eq!(report.exit_code(), 2);
    assert_eq!(report.step(Step::Upload).unwrap().disposition, Disposition::Interrupted);
    assert_eq!(report.step(Step::Publish).unwrap().disposition, Disposition::NotReached);
    assert_eq!(catalog.creates(), ["R1", "R2"]);
    let checkpoint = first.store().load_checkpoint().unwrap().unwrap();
    assert_eq!(checkpoint.next_step(), Some(Step::Upload));
    drop(first);

    let config = PipelineConfig {
        resume: true,
        ..ws.config()
    };
    let mut second = orchestrator(&ws, config, &catalog);
    let report = second.run().unwrap();
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.step(Step::Transform).unwrap().disposition, Disposition::AlreadyDone);
    assert_eq!(report.step(Step::Upload).unwrap().summary.succeeded, 3);
    assert_eq!(catalog.creates(), ["R1", "R2", "R3", "R4", "R5"]);
    assert!(second.store().load_checkpoint().unwrap().unwrap().is_finished());
}

#[test]
fn existing_checkpoint_needs_resume_or_fresh() {
    let ws = Workspace::new();
    five_sources(&ws.sources());
    let catalog = MockCatalog::new();

    let mut orch = orchestrator(&ws, ws.config(), &catalog);
    orch.run().unwrap();
    drop(orch);

    let mut again = orchestrator(&ws, ws.config(), &catalog);
    let err = again.run().unwrap_err();
    assert!(err.to_string().contains("--resume"), "{err}");
    drop(again);

    let config = PipelineConfig {
        fresh: true,
        ..ws.config()
    };
    let mut fresh = orchestrator(&ws, config, &catalog);
    let report = fresh.run().unwrap();
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.step(Step::Upload).unwrap().summary.succeeded, 0);
    assert_eq!(catalog.creates().len(), 5);
}

fn dry_run(ws: &Workspace, config: PipelineConfig) -> Orchestrator {
    let config = PipelineConfig {
        dry_run: true,
        ..config
    };
    let store = ws.open_dry_run(config.environment);
    Orchestrator::new(config, store, Box::new(JsonTransformer)).with_limiter(instant_limiter())
}

/// Registry entry matching R3's title, plus a curator that accepts it.
fn with_coastal_duplicate(ws: &Workspace, orch: Orchestrator) -> Orchestrator {
    let registry = ws.dir.path().join("registry.json");
    std::fs::write(
        &registry,
        r#"[{"identifier": "ext-1", "doi": "10.1234/abc", "title": "Coastal erosion lidar survey"}]"#,
    )
    .unwrap();
    orch.with_matching(MatchingSetup {
        registry_files: vec![registry],
        ..MatchingSetup::default()
    })
    .with_curator(Box::new(ThresholdCurator { threshold: 0.90 }))
}

fn outline(report: &RunReport) -> Vec<(Step, Disposition, StepSummary)> {
    report
        .steps
        .iter()
        .map(|s| (s.step, s.disposition.clone(), s.summary))
        .collect()
}

/// Every file under `dir` with its bytes.
fn snapshot(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    let mut files = BTreeMap::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                files.insert(path.clone(), std::fs::read(&path).unwrap());
            }
        }
    }
    files
}

#[test]
fn dry_run_writes_nothing() {
    let ws = Workspace::new();
    five_sources(&ws.sources());

    let mut orch = dry_run(&ws, ws.config());
    let report = orch.run().unwrap();

    assert!(report.dry_run);
    assert_eq!(report.step(Step::Transform).unwrap().summary.succeeded, 5);
    assert_eq!(report.step(Step::Upload).unwrap().summary.succeeded, 5);
    assert!(report.steps.iter().all(|s| s.disposition == Disposition::Completed));
    assert!(report.reports.is_empty());
    assert!(!ws.output().exists());
}

#[test]
fn dry_run_predicts_a_run_from_scratch() {
    let ws = Workspace::new();
    five_sources(&ws.sources());
    write_sources(&ws.sources(), &[("R6", None)]);

    let mut dry = with_coastal_duplicate(&ws, dry_run(&ws, ws.config()));
    let predicted = dry.run().unwrap();
    drop(dry);
    assert!(!ws.output().exists());

    let catalog = MockCatalog::new();
    let mut real = with_coastal_duplicate(&ws, orchestrator(&ws, ws.config(), &catalog));
    let actual = real.run().unwrap();

    assert_eq!(outline(&predicted), outline(&actual));
    assert_eq!(predicted.exit_code(), actual.exit_code());
    let upload = predicted.step(Step::Upload).unwrap().summary;
    assert_eq!((upload.succeeded, upload.skipped), (4, 1));
    assert_eq!(catalog.creates().len(), 4);
}

#[test]
fn dry_run_on_a_stopped_run_predicts_the_resume() {
    let ws = Workspace::new();
    five_sources(&ws.sources());
    let catalog = MockCatalog::new();

    let config = PipelineConfig {
        interactive: true,
        ..ws.config()
    };
    let mut first = orchestrator(&ws, config, &catalog).with_prompt(Box::new(StopAfterFirstBatch));
    assert_eq!(first.run().unwrap().exit_code(), 2);
    drop(first);

    let state = ws.output().join("state").join("sandbox");
    let before = snapshot(&ws.output());
    assert!(before.contains_key(&state.join("checkpoint.json")));
    assert!(before.contains_key(&state.join("records.jsonl")));

    let resume = PipelineConfig {
        resume: true,
        ..ws.config()
    };
    let mut dry = dry_run(&ws, resume.clone());
    let predicted = dry.run().unwrap();
    drop(dry);
    assert_eq!(snapshot(&ws.output()), before);

    let mut real = orchestrator(&ws, resume, &catalog);
    let actual = real.run().unwrap();
    assert_eq!(outline(&predicted), outline(&actual));
    assert_eq!(predicted.step(Step::Upload).unwrap().summary.succeeded, 3);
    assert_eq!(catalog.creates(), ["R1", "R2", "R3", "R4", "R5"]);
}

#[test]
fn dry_run_refuses_an_existing_checkpoint_without_resume() {
    let ws = Workspace::new();
    five_sources(&ws.sources());
    let catalog = MockCatalog::new();
    orchestrator(&ws, ws.config(), &catalog).run().unwrap();

    let err = dry_run(&ws, ws.config()).run().unwrap_err();
    assert!(err.to_string().contains("--resume"), "{err}");
}

#[test]
fn dry_run_flag_must_match_the_store() {
    let ws = Workspace::new();
    five_sources(&ws.sources());
    let config = PipelineConfig {
        dry_run: true,
        ..ws.config()
    };
    let store = ws.open_store(config.environment);
    let err = Orchestrator::new(config, store, Box::new(JsonTransformer))
        .run()
        .unwrap_err();
    assert!(err.to_string().contains("dry-run store"), "{err}");
}

#[test]
fn failed_transform_waits_for_an_explicit_retry() {
    let ws = Workspace::new();
    five_sources(&ws.sources());
    write_sources(&ws.sources(), &[("R6", None)]);
    let catalog = MockCatalog::new();
    orchestrator(&ws, ws.config(), &catalog).run().unwrap();

    let fresh = PipelineConfig {
        fresh: true,
        ..ws.config()
    };
    let mut again = orchestrator(&ws, fresh.clone(), &catalog);
    let report = again.run().unwrap();
    let transform = report.step(Step::Transform).unwrap().summary;
    assert_eq!((transform.succeeded, transform.failed, transform.skipped), (0, 0, 6));
    assert_eq!(again.store().get("R6").unwrap().status, RecordStatus::Failed);

    // Fix the source and retry the record explicitly.
    write_sources(&ws.sources(), &[("R6", Some("Fjord sediment cores"))]);
    let mut r6 = again.store().get("R6").unwrap();
    assert!(r6.retry());
    again.store().put(r6).unwrap();
    drop(again);

    let mut last = orchestrator(&ws, fresh, &catalog);
    let report = last.run().unwrap();
    assert_eq!(report.step(Step::Transform).unwrap().summary.succeeded, 1);
    assert_eq!(last.store().get("R6").unwrap().status, RecordStatus::Verified);
    assert_eq!(catalog.creates().len(), 6);
}

#[test]
fn production_publish_requires_opt_in() {
    let ws = Workspace::new();
    five_sources(&ws.sources());
    let catalog = MockCatalog::new();

    let config = PipelineConfig {
        environment: Environment::Production,
        ..ws.config()
    };
    let mut orch = orchestrator(&ws, config, &catalog);
    let report = orch.run().unwrap();

    assert!(matches!(
        report.step(Step::Publish).unwrap().disposition,
        Disposition::Skipped(_)
    ));
    assert!(catalog.publishes().is_empty());
    for record in orch.store().records() {
        assert_eq!(record.status, RecordStatus::Uploaded);
        assert_eq!(record.verified, Some(true));
    }
    let checkpoint = orch.store().load_checkpoint().unwrap().unwrap();
    assert!(checkpoint.is_finished());
    assert!(checkpoint
        .warnings
        .iter()
        .any(|w| w.contains("production publishing is disabled")));
}

#[test]
fn prompt_can_skip_a_step() {
    let ws = Workspace::new();
    five_sources(&ws.sources());
    let catalog = MockCatalog::new();

    let config = PipelineConfig {
        interactive: true,
        batch_size: 10,
        ..ws.config()
    };
    let mut orch = orchestrator(&ws, config, &catalog).with_prompt(Box::new(SkipStep(Step::Publish)));
    let report = orch.run().unwrap();

    assert_eq!(
        report.step(Step::Publish).unwrap().disposition,
        Disposition::Skipped("prompt".into())
    );
    assert!(catalog.publishes().is_empty());
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn skip_flag_is_recorded_in_the_checkpoint() {
    let ws = Workspace::new();
    five_sources(&ws.sources());
    let catalog = MockCatalog::new();

    let config = PipelineConfig {
        skip: vec![Step::DuplicateCheck, Step::Verify],
        ..ws.config()
    };
    let mut orch = orchestrator(&ws, config, &catalog);
    let report = orch.run().unwrap();

    assert_eq!(
        report.step(Step::Verify).unwrap().disposition,
        Disposition::Skipped("--skip".into())
    );
    // Unverified records still publish; only failed verification holds them back.
    for record in orch.store().records() {
        assert_eq!(record.status, RecordStatus::Published);
    }
    let checkpoint = orch.store().load_checkpoint().unwrap().unwrap();
    assert_eq!(
        checkpoint.state(Step::DuplicateCheck),
        depoline_store::StepState::Skipped
    );
}
