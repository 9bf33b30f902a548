//! Migration record and its status lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::candidate::DuplicateCandidate;
use super::payload::{PayloadRef, RelatedIdentifier};

/// Per-record migration status.
///
/// Statuses progress forward by [`rank`](RecordStatus::rank). `Failed` sits
/// outside the progression: it is reachable from anywhere and only left
/// through an explicit [`MigrationRecord::retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Pending,
    Transformed,
    DuplicateFlagged,
    Uploaded,
    PublishFailed,
    Published,
    Verified,
    Failed,
}

impl RecordStatus {
    pub const ALL: [Self; 8] = [
        Self::Pending,
        Self::Transformed,
        Self::DuplicateFlagged,
        Self::Uploaded,
        Self::PublishFailed,
        Self::Published,
        Self::Verified,
        Self::Failed,
    ];

    /// Position in the forward progression (`None` for `Failed`).
    pub fn rank(self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Transformed => Some(1),
            Self::DuplicateFlagged => Some(2),
            Self::Uploaded => Some(3),
            Self::PublishFailed => Some(4),
            Self::Published => Some(5),
            Self::Verified => Some(6),
            Self::Failed => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Transformed => "transformed",
            Self::DuplicateFlagged => "duplicate_flagged",
            Self::Uploaded => "uploaded",
            Self::PublishFailed => "publish_failed",
            Self::Published => "published",
            Self::Verified => "verified",
            Self::Failed => "failed",
        }
    }

    /// True once the record exists at the destination.
    pub fn is_uploaded(self) -> bool {
        matches!(
            self,
            Self::Uploaded | Self::PublishFailed | Self::Published | Self::Verified
        )
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        match (self.rank(), next.rank()) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(from), Some(to)) => from <= to,
        }
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected status change (would move a record backwards).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub id: String,
    pub from: RecordStatus,
    pub to: RecordStatus,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: illegal transition {} -> {}", self.id, self.from, self.to)
    }
}

impl std::error::Error for TransitionError {}

/// Matching view of a record, produced by the transformer alongside the payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordDescriptor {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub creators: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
}

/// One source item under migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub id: String,
    pub status: RecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<PayloadRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<RecordDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<DuplicateCandidate>,
    /// Attempts made by the most recent upload.
    #[serde(default)]
    pub attempts: u32,
    /// Outcome of the remote verification pass, if it ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,
    /// Source disappeared from the corpus; kept for the audit trail.
    #[serde(default)]
    pub superseded: bool,
    pub updated_at: DateTime<Utc>,
}

impl MigrationRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: RecordStatus::Pending,
            payload: None,
            descriptor: None,
            remote_id: None,
            persistent_identifier: None,
            last_error: None,
            candidates: Vec::new(),
            attempts: 0,
            verified: None,
            superseded: false,
            updated_at: Utc::now(),
        }
    }

    /// Move to `next`, clearing `last_error` unless the target is `Failed`.
    pub fn transition(&mut self, next: RecordStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next != RecordStatus::Failed {
            self.last_error = None;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = RecordStatus::Failed;
        self.last_error = Some(reason.into());
        self.updated_at = Utc::now();
    }

    /// Record a successful create/update. Identifiers are only ever added.
    pub fn mark_uploaded(
        &mut self,
        remote_id: String,
        persistent_identifier: Option<String>,
    ) -> Result<(), TransitionError> {
        self.transition(RecordStatus::Uploaded)?;
        self.remote_id = Some(remote_id);
        if persistent_identifier.is_some() {
            self.persistent_identifier = persistent_identifier;
        }
        Ok(())
    }

    pub fn mark_published(
        &mut self,
        persistent_identifier: Option<String>,
    ) -> Result<(), TransitionError> {
        self.transition(RecordStatus::Published)?;
        if persistent_identifier.is_some() {
            self.persistent_identifier = persistent_identifier;
        }
        Ok(())
    }

    /// Return a failed record to the furthest status its data supports.
    ///
    /// Returns `false` when the record was not failed.
    pub fn retry(&mut self) -> bool {
        if self.status != RecordStatus::Failed {
            return false;
        }
        self.status = if self.remote_id.is_some() {
            RecordStatus::Uploaded
        } else if self.payload.is_some() {
            RecordStatus::Transformed
        } else {
            RecordStatus::Pending
        };
        self.last_error = None;
        self.attempts = 0;
        self.updated_at = Utc::now();
        true
    }

    /// An accepted high-confidence duplicate exists.
    pub fn is_duplicate_blocked(&self) -> bool {
        self.candidates.iter().any(DuplicateCandidate::blocks_upload)
    }

    /// Related identifiers contributed by accepted, non-blocking candidates.
    pub fn related_identifiers(&self) -> Vec<RelatedIdentifier> {
        self.candidates
            .iter()
            .filter_map(DuplicateCandidate::related_identifier)
            .collect()
    }
}
