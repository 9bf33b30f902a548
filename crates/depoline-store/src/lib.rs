//! depoline-store: durable migration state
//!
//! Per-environment record journal and pipeline checkpoint, hashed payload
//! files, upload outcome logs and reports. Every write is either an fsynced
//! journal append or an atomic tmp+rename replacement.

pub mod atomic;
pub mod checkpoint;
pub mod hash;
pub mod journal;
pub mod lock;
pub mod outcome_log;
pub mod payloads;
pub mod store;

pub use checkpoint::{CHECKPOINT_FORMAT_VERSION, PipelineCheckpoint, Step, StepEntry, StepState};
pub use outcome_log::{OutcomeLog, OutcomeStatus, UploadOutcome};
pub use payloads::PayloadStore;
pub use store::{StatePaths, StateStore, StoreMode};
