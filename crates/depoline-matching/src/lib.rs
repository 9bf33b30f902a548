//! depoline-matching: fuzzy duplicate detection before upload
//!
//! Scores a record's title, abstract and creators against works found in
//! the local registry, the destination's search API, and external
//! bibliographic registries, then sorts the hits into confidence tiers.

pub mod adapters;
pub mod config;
pub mod engine;
pub mod registry;
pub mod similarity;

pub use adapters::{AdapterConfig, CROSSREF_URL, CrossrefAdapter, DATACITE_URL, DataCiteAdapter};
pub use config::{MatchingConfig, Weights};
pub use engine::{DestinationSearch, MatchingEngine, carry_decisions};
pub use registry::{CandidateRecord, LocalRegistry, RegistryAdapter, RegistryEntry};
