//! Destination catalog interface

use serde::{Deserialize, Serialize};

use crate::error::CallError;
use crate::model::Payload;

/// Remote state of a deposit after create/update/publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deposit {
    pub remote_id: String,
    /// Reserved or minted DOI, when the catalog provides one.
    pub persistent_identifier: Option<String>,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub title: String,
    pub max_results: usize,
}

/// A record as the destination reports it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub remote_id: String,
    pub title: String,
    pub description: Option<String>,
    pub creators: Vec<String>,
    pub keywords: Vec<String>,
    pub doi: Option<String>,
    pub url: Option<String>,
    pub state: Option<String>,
}

/// Thin request/response wrapper over the destination API.
///
/// Implementations do not retry or throttle; callers wrap each call in
/// [`call_with_retry`](crate::retry::call_with_retry).
pub trait CatalogClient: Send + Sync {
    fn create(&self, payload: &Payload) -> Result<Deposit, CallError>;
    fn update(&self, remote_id: &str, payload: &Payload) -> Result<Deposit, CallError>;
    fn search(&self, query: &SearchQuery) -> Result<Vec<RemoteRecord>, CallError>;
    fn get(&self, remote_id: &str) -> Result<RemoteRecord, CallError>;
    fn publish(&self, remote_id: &str) -> Result<Deposit, CallError>;
}
