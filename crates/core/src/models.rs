//! Domain model types shared by the sync components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ConflictError;

// ---------------------------------------------------------------------------
// Change type
// ---------------------------------------------------------------------------

/// What a sync client did to a file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

// ---------------------------------------------------------------------------
// Change
// ---------------------------------------------------------------------------

/// One edit event to a file, as reported by a sync client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Change {
    /// Identifier of the file being changed.
    pub file_id: String,
    /// The kind of change.
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    /// Logical path of the file at the time of the change.
    pub path: String,
    /// Wall-clock time the change was made.
    pub timestamp: DateTime<Utc>,
    /// Per-file version number, monotonically increasing.
    pub version: u64,
    /// File content after the change, when the client sent it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<u8>>,
}

impl Change {
    /// Create a change record without content.
    pub fn new(
        file_id: impl Into<String>,
        change_type: ChangeType,
        path: impl Into<String>,
        timestamp: DateTime<Utc>,
        version: u64,
    ) -> Self {
        Self {
            file_id: file_id.into(),
            change_type,
            path: path.into(),
            timestamp,
            version,
            content: None,
        }
    }

    /// Attach content to the change.
    pub fn with_content(mut self, content: impl Into<Vec<u8>>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Check that the change can take part in a state-mutating operation.
    pub fn validate(&self) -> Result<(), ConflictError> {
        if self.file_id.trim().is_empty() {
            return Err(ConflictError::InvalidChange(format!(
                "{} of '{}' has an empty file id",
                self.change_type, self.path
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_change_type_serde() {
        let json = serde_json::to_string(&ChangeType::Delete).unwrap();
        assert_eq!(json, "\"delete\"");
        let parsed: ChangeType = serde_json::from_str("\"update\"").unwrap();
        assert_eq!(parsed, ChangeType::Update);
    }

    #[test]
    fn test_change_json_shape() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let change = Change::new("f-1", ChangeType::Update, "docs/a.txt", ts, 3);
        let value = serde_json::to_value(&change).unwrap();
        assert_eq!(value["file_id"], "f-1");
        assert_eq!(value["type"], "update");
        assert_eq!(value["version"], 3);
        assert!(value.get("content").is_none());
    }

    #[test]
    fn test_validate_rejects_empty_file_id() {
        let change = Change::new("", ChangeType::Delete, "a.txt", Utc::now(), 1);
        assert!(matches!(
            change.validate(),
            Err(ConflictError::InvalidChange(_))
        ));
        let change = Change::new("f-1", ChangeType::Delete, "a.txt", Utc::now(), 1);
        assert!(change.validate().is_ok());
    }
}
