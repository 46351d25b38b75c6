//! Conflict detection logic.
//!
//! Two change records conflict when they refer to the same file. Changes to
//! different files never conflict, whatever their timestamps or versions.
//! Detection only flags that resolution is needed; it never picks a winner.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{Change, ChangeType};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Categorisation of a conflict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictType {
    /// Both sides created or updated the same file.
    ModifyModify,
    /// One side deleted the file, the other edited it.
    EditDelete,
    /// Both sides deleted the file.
    DeleteDelete,
}

impl std::fmt::Display for ConflictType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ModifyModify => write!(f, "modify-modify"),
            Self::EditDelete => write!(f, "edit-delete"),
            Self::DeleteDelete => write!(f, "delete-delete"),
        }
    }
}

/// A detected divergence between two changes to the same file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    /// Unique conflict ID.
    pub id: String,
    /// The file both changes target.
    pub file_id: String,
    /// Path reported by the local side.
    pub path: String,
    /// The type of conflict.
    pub conflict_type: ConflictType,
    /// Version carried by the local change.
    pub local_version: u64,
    /// Version carried by the remote change.
    pub remote_version: u64,
    /// When the conflict was detected.
    pub detected_at: DateTime<Utc>,
}

impl Conflict {
    /// Create a new conflict with a fresh UUID.
    pub fn new(local: &Change, remote: &Change, conflict_type: ConflictType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            file_id: local.file_id.clone(),
            path: local.path.clone(),
            conflict_type,
            local_version: local.version,
            remote_version: remote.version,
            detected_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// Stateless conflict detector.
pub struct ConflictDetector;

impl ConflictDetector {
    /// Compare one local and one remote change.
    ///
    /// Returns `None` when the changes target different files, or when
    /// either carries a blank file id (an unidentified change matches nothing).
    pub fn detect(local: &Change, remote: &Change) -> Option<Conflict> {
        if local.file_id.trim().is_empty() || local.file_id != remote.file_id {
            return None;
        }

        let conflict = Conflict::new(local, remote, classify_conflict(local, remote));
        debug!(
            file_id = %conflict.file_id,
            conflict_type = %conflict.conflict_type,
            "conflict detected"
        );
        Some(conflict)
    }

    /// Compare two batches of changes and return every conflict.
    ///
    /// When one batch holds several changes for a file, the last one counts.
    pub fn detect_all(local_changes: &[Change], remote_changes: &[Change]) -> Vec<Conflict> {
        info!(
            local_count = local_changes.len(),
            remote_count = remote_changes.len(),
            "detecting conflicts"
        );

        let remote_by_file: HashMap<&str, &Change> = remote_changes
            .iter()
            .map(|c| (c.file_id.as_str(), c))
            .collect();
        let local_by_file: HashMap<&str, &Change> = local_changes
            .iter()
            .map(|c| (c.file_id.as_str(), c))
            .collect();

        let mut conflicts: Vec<Conflict> = local_by_file
            .values()
            .filter_map(|local| {
                remote_by_file
                    .get(local.file_id.as_str())
                    .and_then(|remote| Self::detect(local, remote))
            })
            .collect();
        conflicts.sort_by(|a, b| a.file_id.cmp(&b.file_id));

        info!(count = conflicts.len(), "conflict detection complete");
        conflicts
    }
}

/// Classify a same-file conflict. Symmetric in its arguments.
fn classify_conflict(local: &Change, remote: &Change) -> ConflictType {
    match (local.change_type, remote.change_type) {
        (ChangeType::Delete, ChangeType::Delete) => ConflictType::DeleteDelete,
        (ChangeType::Delete, _) | (_, ChangeType::Delete) => ConflictType::EditDelete,
        _ => ConflictType::ModifyModify,
    }
}
