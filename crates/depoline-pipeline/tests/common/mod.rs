#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

use depoline_core::{
    CallError, CatalogClient, Deposit, Environment, ManualClock, Payload, RateLimitConfig,
    RateLimiter, RecordDescriptor, RemoteRecord, SearchQuery, TransformError, Transformed,
    Transformer,
};
use depoline_pipeline::PipelineConfig;
use depoline_store::{StateStore, StoreMode};
use serde::Deserialize;
use tempfile::TempDir;

/// Source document understood by [`JsonTransformer`].
#[derive(Debug, Deserialize)]
struct Source {
    title: Option<String>,
    #[serde(default)]
    creators: Vec<String>,
    #[serde(default)]
    keywords: Vec<String>,
}

/// `<id>.json` sources -> payload `{"id", "title", "creators", "keywords"}`.
pub struct JsonTransformer;

impl Transformer for JsonTransformer {
    fn source_pattern(&self) -> &str {
        "*.json"
    }

    fn transform(&self, source: &Path) -> Result<Transformed, TransformError> {
        let text = std::fs::read_to_string(source)?;
        let src: Source =
            serde_json::from_str(&text).map_err(|e| TransformError::Parse(e.to_string()))?;
        let title = src.title.ok_or(TransformError::Missing("title"))?;
        let id = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let body = serde_json::json!({
            "id": id,
            "title": title,
            "creators": src.creators,
            "keywords": src.keywords,
        });
        Ok(Transformed {
            payload: Payload::from_json(body.to_string())
                .map_err(|e| TransformError::Parse(e.to_string()))?,
            descriptor: RecordDescriptor {
                title,
                abstract_text: None,
                creators: src.creators,
                keywords: src.keywords,
                doi: None,
            },
        })
    }
}

#[derive(Debug, Deserialize)]
struct Body {
    id: String,
    title: String,
    creators: Vec<String>,
    keywords: Vec<String>,
}

#[derive(Default)]
struct CatalogState {
    next_id: u32,
    deposits: BTreeMap<String, Body>,
    /// Record id -> errors returned by the next create/update calls.
    script: HashMap<String, VecDeque<CallError>>,
    creates: Vec<String>,
    publishes: Vec<String>,
}

/// In-memory destination catalog with scripted failures.
#[derive(Default)]
pub struct MockCatalog {
    state: Mutex<CatalogState>,
}

impl MockCatalog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next create/update calls for `record_id` fail with `errors`, in order.
    pub fn fail_next(&self, record_id: &str, errors: Vec<CallError>) {
        self.state
            .lock()
            .unwrap()
            .script
            .entry(record_id.to_string())
            .or_default()
            .extend(errors);
    }

    /// Record ids passed to `create`, in call order.
    pub fn creates(&self) -> Vec<String> {
        self.state.lock().unwrap().creates.clone()
    }

    pub fn publishes(&self) -> Vec<String> {
        self.state.lock().unwrap().publishes.clone()
    }

    fn body(payload: &Payload) -> Result<Body, CallError> {
        serde_json::from_str(payload.body()).map_err(|e| CallError::Validation {
            status: 400,
            message: e.to_string(),
        })
    }

    fn scripted(&self, record_id: &str) -> Option<CallError> {
        self.state
            .lock()
            .unwrap()
            .script
            .get_mut(record_id)
            .and_then(VecDeque::pop_front)
    }
}

fn deposit(remote_id: &str, doi: Option<String>, state: &str) -> Deposit {
    Deposit {
        remote_id: remote_id.to_string(),
        persistent_identifier: doi,
        state: state.to_string(),
    }
}

impl CatalogClient for MockCatalog {
    fn create(&self, payload: &Payload) -> Result<Deposit, CallError> {
        let body = Self::body(payload)?;
        if let Some(err) = self.scripted(&body.id) {
            return Err(err);
        }
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let remote_id = state.next_id.to_string();
        state.creates.push(body.id.clone());
        state.deposits.insert(remote_id.clone(), body);
        Ok(deposit(&remote_id, None, "unsubmitted"))
    }

    fn update(&self, remote_id: &str, payload: &Payload) -> Result<Deposit, CallError> {
        let body = Self::body(payload)?;
        if let Some(err) = self.scripted(&body.id) {
            return Err(err);
        }
        let mut state = self.state.lock().unwrap();
        state.deposits.insert(remote_id.to_string(), body);
        Ok(deposit(remote_id, None, "unsubmitted"))
    }

    fn search(&self, _: &SearchQuery) -> Result<Vec<RemoteRecord>, CallError> {
        Ok(Vec::new())
    }

    fn get(&self, remote_id: &str) -> Result<RemoteRecord, CallError> {
        let state = self.state.lock().unwrap();
        let body = state.deposits.get(remote_id).ok_or(CallError::Validation {
            status: 404,
            message: "not found".into(),
        })?;
        Ok(RemoteRecord {
            remote_id: remote_id.to_string(),
            title: body.title.clone(),
            creators: body.creators.clone(),
            keywords: body.keywords.clone(),
            ..RemoteRecord::default()
        })
    }

    fn publish(&self, remote_id: &str) -> Result<Deposit, CallError> {
        let mut state = self.state.lock().unwrap();
        if !state.deposits.contains_key(remote_id) {
            return Err(CallError::Validation {
                status: 404,
                message: "not found".into(),
            });
        }
        state.publishes.push(remote_id.to_string());
        Ok(deposit(
            remote_id,
            Some(format!("10.5072/mock.{remote_id}")),
            "done",
        ))
    }
}

pub fn transient() -> CallError {
    CallError::Transient {
        status: Some(503),
        message: "service unavailable".into(),
    }
}

/// Limiter on a virtual clock so backoff and pacing never sleep.
pub fn instant_limiter() -> Arc<RateLimiter> {
    Arc::new(RateLimiter::with_clock(
        RateLimitConfig::default(),
        Arc::new(ManualClock::new()),
    ))
}

/// Writes `<id>.json` sources. A `None` title produces an invalid source.
pub fn write_sources(dir: &Path, records: &[(&str, Option<&str>)]) {
    std::fs::create_dir_all(dir).unwrap();
    for (id, title) in records {
        let doc = serde_json::json!({
            "title": title,
            "creators": [format!("Author of {id}")],
            "keywords": ["hydrology", *id],
        });
        std::fs::write(dir.join(format!("{id}.json")), doc.to_string()).unwrap();
    }
}

/// Five sources with unrelated titles.
pub fn five_sources(dir: &Path) {
    write_sources(
        dir,
        &[
            ("R1", Some("Alpine glacier mass balance")),
            ("R2", Some("Benthic invertebrates of Puget Sound")),
            ("R3", Some("Coastal erosion lidar survey")),
            ("R4", Some("Desert soil crust microbiology")),
            ("R5", Some("Estuary salinity profiles")),
        ],
    );
}

pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn sources(&self) -> std::path::PathBuf {
        self.dir.path().join("sources")
    }

    pub fn output(&self) -> std::path::PathBuf {
        self.dir.path().join("output")
    }

    pub fn config(&self) -> PipelineConfig {
        PipelineConfig {
            source_dir: self.sources(),
            output_dir: self.output(),
            batch_size: 2,
            ..PipelineConfig::default()
        }
    }

    pub fn open_store(&self, environment: Environment) -> StateStore {
        StateStore::open(&self.output(), environment, StoreMode::ReadWrite).unwrap()
    }

    pub fn open_dry_run(&self, environment: Environment) -> StateStore {
        StateStore::open(&self.output(), environment, StoreMode::DryRun).unwrap()
    }
}
