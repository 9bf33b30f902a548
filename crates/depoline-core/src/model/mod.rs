//! Records, candidates, and payloads shared by every pipeline stage

pub mod candidate;
pub mod payload;
pub mod record;

pub use candidate::{CandidateSource, Decision, DuplicateCandidate, ScoreBreakdown, Tier};
pub use payload::{PAYLOAD_SCHEMA_VERSION, Payload, PayloadRef, RelatedIdentifier};
pub use record::{MigrationRecord, RecordDescriptor, RecordStatus, TransitionError};
