//! Depoline Core - shared building blocks for catalog migration
//!
//! Record model, throttling and retry for outbound calls, the catalog and
//! transformer interfaces, and terminal plumbing (logging, progress, stop).

pub mod catalog;
pub mod clock;
pub mod environment;
pub mod error;
pub mod http;
pub mod logging;
pub mod model;
pub mod progress;
pub mod rate_limit;
pub mod retry;
pub mod shutdown;
pub mod transform;
pub mod work_queue;

// Re-exports for convenience
pub use catalog::{CatalogClient, Deposit, RemoteRecord, SearchQuery};
pub use clock::{Clock, ManualClock, SystemClock};
pub use environment::Environment;
pub use error::CallError;
pub use http::{HttpConfig, HttpResponse, SHARED_RUNTIME, http_client, set_http_config};
pub use logging::{IndicatifLogger, Verbosity, init_logging};
pub use model::{
    CandidateSource, Decision, DuplicateCandidate, MigrationRecord, PAYLOAD_SCHEMA_VERSION,
    Payload, PayloadRef, RecordDescriptor, RecordStatus, RelatedIdentifier, ScoreBreakdown, Tier,
};
pub use progress::{ProgressContext, SharedProgress, fmt_duration, fmt_num};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use retry::{Retried, RetryPolicy, RetryState, call_with_retry};
pub use shutdown::{StopFlag, global_stop, install_signal_handlers};
pub use transform::{TransformError, Transformed, Transformer};
pub use work_queue::WorkQueue;
