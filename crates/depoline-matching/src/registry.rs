//! Candidate sources: the local registry and external registry adapters

use std::path::Path;

use depoline_core::{CallError, MigrationRecord, RecordDescriptor};
use serde::{Deserialize, Serialize};

/// Existing work as reported by any source, before scoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub identifier: Option<String>,
    #[serde(default)]
    pub doi: Option<String>,
    pub title: String,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub creators: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// External bibliographic registry searched for prior publications.
pub trait RegistryAdapter: Send + Sync {
    /// Short name used in candidate sources and logs (`crossref`, `datacite`).
    fn name(&self) -> &str;

    fn search(&self, descriptor: &RecordDescriptor) -> Result<Vec<CandidateRecord>, CallError>;
}

/// One entry of the local registry. `record_id` ties it to a migration record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    #[serde(default)]
    pub record_id: Option<String>,
    #[serde(flatten)]
    pub candidate: CandidateRecord,
}

/// Works already known to exist at the destination: records this migration
/// uploaded, plus an optional hand-maintained JSON list.
#[derive(Debug, Default, Clone)]
pub struct LocalRegistry {
    entries: Vec<RegistryEntry>,
}

impl LocalRegistry {
    pub fn new(entries: Vec<RegistryEntry>) -> Self {
        Self { entries }
    }

    /// Entries from uploaded records that carry a descriptor.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a MigrationRecord>) -> Self {
        let entries = records
            .into_iter()
            .filter(|r| r.status.is_uploaded())
            .filter_map(|r| {
                let d = r.descriptor.as_ref()?;
                Some(RegistryEntry {
                    record_id: Some(r.id.clone()),
                    candidate: CandidateRecord {
                        identifier: r.remote_id.clone(),
                        doi: r.persistent_identifier.clone(),
                        title: d.title.clone(),
                        abstract_text: d.abstract_text.clone(),
                        creators: d.creators.clone(),
                        url: None,
                    },
                })
            })
            .collect();
        Self { entries }
    }

    /// Append entries from a JSON array file.
    pub fn extend_from_file(&mut self, path: &Path) -> Result<usize, String> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        let extra: Vec<RegistryEntry> = serde_json::from_str(&json)
            .map_err(|e| format!("invalid registry file {}: {e}", path.display()))?;
        let n = extra.len();
        self.entries.extend(extra);
        Ok(n)
    }

    /// Entries other than the record itself.
    pub fn others<'a>(&'a self, record_id: &'a str) -> impl Iterator<Item = &'a RegistryEntry> {
        self.entries
            .iter()
            .filter(move |e| e.record_id.as_deref() != Some(record_id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depoline_core::RecordStatus;

    fn uploaded(id: &str, title: &str) -> MigrationRecord {
        let mut r = MigrationRecord::new(id);
        r.descriptor = Some(RecordDescriptor {
            title: title.into(),
            ..RecordDescriptor::default()
        });
        r.mark_uploaded(format!("remote-{id}"), Some(format!("10.5072/zenodo.{id}")))
            .unwrap();
        r
    }

    #[test]
    fn only_uploaded_records_enter_registry() {
        let mut pending = MigrationRecord::new("p");
        pending.descriptor = Some(RecordDescriptor::default());
        let records = [uploaded("a", "Kelp"), pending];
        let reg = LocalRegistry::from_records(&records);
        assert_eq!(reg.len(), 1);
        let entry = reg.others("x").next().unwrap();
        assert_eq!(entry.candidate.identifier.as_deref(), Some("remote-a"));
        assert_eq!(records[0].status, RecordStatus::Uploaded);
    }

    #[test]
    fn record_never_matches_itself() {
        let records = [uploaded("a", "Kelp"), uploaded("b", "Kelp")];
        let reg = LocalRegistry::from_records(&records);
        let ids: Vec<_> = reg.others("a").filter_map(|e| e.record_id.as_deref()).collect();
        assert_eq!(ids, ["b"]);
    }

    #[test]
    fn registry_file_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(
            &path,
            r#"[{"identifier": "https://doi.org/10.1/x", "doi": "10.1/x", "title": "Legacy survey"}]"#,
        )
        .unwrap();
        let mut reg = LocalRegistry::default();
        assert_eq!(reg.extend_from_file(&path).unwrap(), 1);
        assert_eq!(reg.others("any").count(), 1);
    }
}
