//! Opaque payload envelope passed from the transformer to the catalog client

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// Current payload envelope version. Bump when `body` semantics change.
pub const PAYLOAD_SCHEMA_VERSION: u32 = 1;

/// Transformed record ready for the catalog.
///
/// `body` is raw JSON owned by the transformer and the catalog client; the
/// orchestration core never looks inside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payload {
    pub schema_version: u32,
    pub body: Box<RawValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_identifiers: Vec<RelatedIdentifier>,
}

impl Payload {
    /// Wrap a JSON document produced by a transformer.
    pub fn from_json(body: String) -> Result<Self, serde_json::Error> {
        Ok(Self {
            schema_version: PAYLOAD_SCHEMA_VERSION,
            body: RawValue::from_string(body)?,
            related_identifiers: Vec::new(),
        })
    }

    pub fn body(&self) -> &str {
        self.body.get()
    }

    /// Replace the curator-approved links (deduplicated by identifier).
    pub fn with_related_identifiers(mut self, mut related: Vec<RelatedIdentifier>) -> Self {
        related.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        related.dedup_by(|a, b| a.identifier == b.identifier);
        self.related_identifiers = related;
        self
    }
}

/// Link to an existing work, attached only from accepted candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedIdentifier {
    pub identifier: String,
    pub relation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
}

/// Where a record's payload lives on disk and what it hashed to when written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadRef {
    pub path: PathBuf,
    pub content_hash: String,
    pub schema_version: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_is_kept_verbatim() {
        let p = Payload::from_json(r#"{"metadata":{"title":"T"}}"#.to_string()).unwrap();
        assert_eq!(p.body(), r#"{"metadata":{"title":"T"}}"#);
        assert_eq!(p.schema_version, PAYLOAD_SCHEMA_VERSION);
    }

    #[test]
    fn invalid_json_rejected() {
        assert!(Payload::from_json("{not json".to_string()).is_err());
    }

    #[test]
    fn related_identifiers_deduplicated() {
        let link = |id: &str| RelatedIdentifier {
            identifier: id.into(),
            relation: "isAlternativeIdentifierOf".into(),
            scheme: None,
        };
        let p = Payload::from_json("{}".to_string())
            .unwrap()
            .with_related_identifiers(vec![link("b"), link("a"), link("b")]);
        let ids: Vec<_> = p.related_identifiers.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }
}
