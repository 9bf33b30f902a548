//! Duplicate candidates and curator decisions

use serde::{Deserialize, Serialize};

use super::payload::RelatedIdentifier;

/// Where a candidate was found.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum CandidateSource {
    LocalRegistry,
    DestinationSearch,
    ExternalRegistry(String),
}

impl std::fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LocalRegistry => f.write_str("local"),
            Self::DestinationSearch => f.write_str("destination"),
            Self::ExternalRegistry(name) => write!(f, "external:{name}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    HighConfidence,
    Review,
    LowConfidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    #[default]
    Unresolved,
    Accepted,
    Rejected,
    Deferred,
}

impl Decision {
    /// Still waiting for a curator.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Unresolved | Self::Deferred)
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Unresolved => "unresolved",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Deferred => "deferred",
        })
    }
}

/// Per-signal similarity. Signals absent on either side are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub title: f64,
    pub abstract_text: Option<f64>,
    pub creators: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateCandidate {
    pub source: CandidateSource,
    /// Remote id, DOI URL, or registry id of the existing entry.
    pub identifier: Option<String>,
    pub doi: Option<String>,
    pub title: String,
    pub url: Option<String>,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    pub tier: Tier,
    #[serde(default)]
    pub decision: Decision,
}

impl DuplicateCandidate {
    pub fn blocks_upload(&self) -> bool {
        self.decision == Decision::Accepted && self.tier == Tier::HighConfidence
    }

    pub fn has_doi(&self) -> bool {
        self.doi.as_deref().is_some_and(|d| !d.is_empty())
    }

    /// Stable key used to carry decisions across re-runs of matching.
    pub fn key(&self) -> (String, String) {
        let id = self
            .identifier
            .clone()
            .unwrap_or_else(|| self.title.to_lowercase());
        (self.source.to_string(), id)
    }

    /// Link to attach to the payload; only accepted candidates that do not block upload.
    pub fn related_identifier(&self) -> Option<RelatedIdentifier> {
        if self.decision != Decision::Accepted || self.blocks_upload() {
            return None;
        }
        if let Some(doi) = self.doi.as_deref().filter(|d| !d.is_empty()) {
            return Some(RelatedIdentifier {
                identifier: doi.to_string(),
                relation: "isAlternativeIdentifierOf".to_string(),
                scheme: Some("doi".to_string()),
            });
        }
        let identifier = self.url.clone().or_else(|| self.identifier.clone())?;
        Some(RelatedIdentifier {
            identifier,
            relation: "isAlternativeIdentifierOf".to_string(),
            scheme: Some("url".to_string()),
        })
    }
}
