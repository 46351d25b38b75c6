//! Named resolution strategies.
//!
//! The built-ins are modelled as the closed [`Strategy`] enum; anything
//! else is a [`Strategy::Custom`] name looked up in the resolver's
//! registry. Every registered strategy implements [`ResolutionStrategy`],
//! which closures of the right shape implement automatically.

use std::cmp::Ordering;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::merger::{line_merge, three_way_merge};
use crate::errors::ConflictError;
use crate::models::{Change, ChangeType};

// ---------------------------------------------------------------------------
// Strategy names
// ---------------------------------------------------------------------------

/// A strategy name: one of the built-ins or a custom registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// The local change wins unconditionally.
    LocalWins,
    /// The remote change wins unconditionally.
    RemoteWins,
    /// The change with the later timestamp wins.
    NewestWins,
    /// Three-way merge of the changes' content.
    Merge,
    /// A strategy registered at runtime under this name.
    Custom(String),
}

impl Strategy {
    /// The registry key for this strategy.
    pub fn as_str(&self) -> &str {
        match self {
            Self::LocalWins => "local_wins",
            Self::RemoteWins => "remote_wins",
            Self::NewestWins => "newest_wins",
            Self::Merge => "merge",
            Self::Custom(name) => name,
        }
    }

    /// The built-in strategies.
    pub fn builtins() -> [Strategy; 4] {
        [Self::LocalWins, Self::RemoteWins, Self::NewestWins, Self::Merge]
    }
}

impl From<&str> for Strategy {
    fn from(name: &str) -> Self {
        match name {
            "local_wins" => Self::LocalWins,
            "remote_wins" => Self::RemoteWins,
            "newest_wins" => Self::NewestWins,
            "merge" => Self::Merge,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl FromStr for Strategy {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How `newest_wins` settles equal timestamps.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Higher version wins; local wins if the versions are equal too.
    #[default]
    HigherVersion,
    PreferLocal,
    PreferRemote,
}

// ---------------------------------------------------------------------------
// Strategy trait
// ---------------------------------------------------------------------------

/// Decides the authoritative change for two conflicting changes to the
/// same file. `base` is the common ancestor content, when known.
pub trait ResolutionStrategy: Send + Sync {
    fn resolve(
        &self,
        local: &Change,
        remote: &Change,
        base: Option<&[u8]>,
    ) -> Result<Change, ConflictError>;
}

impl<F> ResolutionStrategy for F
where
    F: Fn(&Change, &Change, Option<&[u8]>) -> Result<Change, ConflictError> + Send + Sync,
{
    fn resolve(
        &self,
        local: &Change,
        remote: &Change,
        base: Option<&[u8]>,
    ) -> Result<Change, ConflictError> {
        self(local, remote, base)
    }
}

// ---------------------------------------------------------------------------
// Built-ins
// ---------------------------------------------------------------------------

/// Returns the local change.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalWins;

impl ResolutionStrategy for LocalWins {
    fn resolve(
        &self,
        local: &Change,
        _: &Change,
        _: Option<&[u8]>,
    ) -> Result<Change, ConflictError> {
        Ok(local.clone())
    }
}

/// Returns the remote change.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteWins;

impl ResolutionStrategy for RemoteWins {
    fn resolve(
        &self,
        _: &Change,
        remote: &Change,
        _: Option<&[u8]>,
    ) -> Result<Change, ConflictError> {
        Ok(remote.clone())
    }
}

/// Returns the more recent change.
#[derive(Debug, Clone, Copy, Default)]
pub struct NewestWins {
    pub tie_break: TieBreak,
}

impl NewestWins {
    /// Pick the winning side without cloning it.
    pub fn pick<'a>(&self, local: &'a Change, remote: &'a Change) -> &'a Change {
        match local.timestamp.cmp(&remote.timestamp) {
            Ordering::Greater => local,
            Ordering::Less => remote,
            Ordering::Equal => match self.tie_break {
                TieBreak::PreferLocal => local,
                TieBreak::PreferRemote => remote,
                TieBreak::HigherVersion => {
                    if remote.version > local.version {
                        remote
                    } else {
                        local
                    }
                }
            },
        }
    }
}

impl ResolutionStrategy for NewestWins {
    fn resolve(
        &self,
        local: &Change,
        remote: &Change,
        _: Option<&[u8]>,
    ) -> Result<Change, ConflictError> {
        Ok(self.pick(local, remote).clone())
    }
}

/// Merges the content of both changes against the common ancestor.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeContent {
    /// Combine divergent edits to different lines.
    pub line_merge: bool,
}

impl ResolutionStrategy for MergeContent {
    fn resolve(
        &self,
        local: &Change,
        remote: &Change,
        base: Option<&[u8]>,
    ) -> Result<Change, ConflictError> {
        let unresolvable = |detail: &str| ConflictError::Unresolvable {
            file_id: local.file_id.clone(),
            detail: detail.to_string(),
            conflicted: None,
        };

        match (local.change_type, remote.change_type) {
            (ChangeType::Delete, ChangeType::Delete) => return Ok(local.clone()),
            (ChangeType::Delete, _) | (_, ChangeType::Delete) => {
                return Err(unresolvable(
                    "one side deleted the file while the other edited it",
                ))
            }
            _ => {}
        }

        let (Some(ours), Some(theirs)) = (local.content.as_deref(), remote.content.as_deref())
        else {
            return Err(ConflictError::InvalidChange(format!(
                "merging '{}' needs content from both sides",
                local.file_id
            )));
        };

        let merged = match base {
            Some(base) if self.line_merge => line_merge(base, ours, theirs),
            Some(base) => three_way_merge(base, ours, theirs),
            None if ours == theirs => Ok(ours.to_vec()),
            None => return Err(unresolvable("contents differ and no common ancestor is known")),
        }
        .map_err(|e| ConflictError::from_merge(&local.file_id, e))?;

        if merged == theirs {
            return Ok(remote.clone());
        }
        if merged == ours {
            return Ok(local.clone());
        }

        debug!(file_id = %local.file_id, bytes = merged.len(), "built merged change");
        let mut resolved = NewestWins::default().pick(local, remote).clone();
        resolved.change_type = ChangeType::Update;
        resolved.version = local.version.max(remote.version);
        resolved.content = Some(merged);
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn pair() -> (Change, Change) {
        let now = Utc::now();
        let local = Change::new("f", ChangeType::Update, "/f.txt", now, 3);
        let remote = Change::new("f", ChangeType::Update, "/f.txt", now + Duration::seconds(10), 2);
        (local, remote)
    }

    #[test]
    fn test_strategy_names_round_trip() {
        for s in Strategy::builtins() {
            assert_eq!(Strategy::from(s.as_str()), s);
        }
        assert_eq!(
            "majority_vote".parse::<Strategy>().unwrap(),
            Strategy::Custom("majority_vote".into())
        );
        assert_eq!(Strategy::NewestWins.to_string(), "newest_wins");
    }

    #[test]
    fn test_local_and_remote_wins() {
        let (local, remote) = pair();
        assert_eq!(LocalWins.resolve(&local, &remote, None).unwrap(), local);
        assert_eq!(RemoteWins.resolve(&local, &remote, None).unwrap(), remote);
    }

    #[test]
    fn test_newest_wins_by_timestamp() {
        let (local, remote) = pair();
        let s = NewestWins::default();
        assert_eq!(s.resolve(&local, &remote, None).unwrap(), remote);
        assert_eq!(s.resolve(&remote, &local, None).unwrap(), remote);
    }

    #[test]
    fn test_newest_wins_tie_breaks() {
        let (local, mut remote) = pair();
        remote.timestamp = local.timestamp;

        let higher = NewestWins::default();
        assert_eq!(higher.pick(&local, &remote).version, 3);
        remote.version = 9;
        assert_eq!(higher.pick(&local, &remote).version, 9);

        let prefer_local = NewestWins {
            tie_break: TieBreak::PreferLocal,
        };
        assert_eq!(prefer_local.pick(&local, &remote).version, 3);

        let prefer_remote = NewestWins {
            tie_break: TieBreak::PreferRemote,
        };
        remote.version = 1;
        assert_eq!(prefer_remote.pick(&local, &remote).version, 1);
    }

    #[test]
    fn test_merge_takes_remote_when_local_unchanged() {
        let (local, remote) = pair();
        let local = local.with_content(b"base".to_vec());
        let remote = remote.with_content(b"remote".to_vec());
        let resolved = MergeContent::default()
            .resolve(&local, &remote, Some(b"base".as_slice()))
            .unwrap();
        assert_eq!(resolved, remote);
    }

    #[test]
    fn test_merge_divergent_is_unresolvable() {
        let (local, remote) = pair();
        let local = local.with_content(b"mine".to_vec());
        let remote = remote.with_content(b"theirs".to_vec());
        let err = MergeContent::default()
            .resolve(&local, &remote, Some(b"base".as_slice()))
            .unwrap_err();
        assert!(err.is_unresolvable());
    }

    #[test]
    fn test_merge_without_base() {
        let (local, remote) = pair();
        let same_l = local.clone().with_content(b"same".to_vec());
        let same_r = remote.clone().with_content(b"same".to_vec());
        assert!(MergeContent::default().resolve(&same_l, &same_r, None).is_ok());

        let diff_r = remote.with_content(b"other".to_vec());
        let err = MergeContent::default()
            .resolve(&same_l, &diff_r, None)
            .unwrap_err();
        assert!(err.is_unresolvable());
    }

    #[test]
    fn test_merge_needs_content() {
        let (local, remote) = pair();
        let err = MergeContent::default()
            .resolve(&local, &remote, Some(b"base".as_slice()))
            .unwrap_err();
        assert!(matches!(err, ConflictError::InvalidChange(_)));
    }

    #[test]
    fn test_merge_edit_delete_is_unresolvable() {
        let (local, mut remote) = pair();
        remote.change_type = ChangeType::Delete;
        let local = local.with_content(b"edit".to_vec());
        let err = MergeContent::default()
            .resolve(&local, &remote, Some(b"base".as_slice()))
            .unwrap_err();
        assert!(err.is_unresolvable());
    }

    #[test]
    fn test_line_merge_builds_new_change() {
        let base = b"one\ntwo\nthree\nfour\nfive\nsix\nseven\neight\n";
        let (local, remote) = pair();
        let local =
            local.with_content(b"ONE\ntwo\nthree\nfour\nfive\nsix\nseven\neight\n".to_vec());
        let remote =
            remote.with_content(b"one\ntwo\nthree\nfour\nfive\nsix\nseven\nEIGHT\n".to_vec());
        let resolved = MergeContent { line_merge: true }
            .resolve(&local, &remote, Some(base.as_slice()))
            .unwrap();
        assert_eq!(
            resolved.content.as_deref(),
            Some(&b"ONE\ntwo\nthree\nfour\nfive\nsix\nseven\nEIGHT\n"[..])
        );
        assert_eq!(resolved.version, 3);
        assert_eq!(resolved.timestamp, remote.timestamp);
    }

    #[test]
    fn test_closure_is_a_strategy() {
        let (local, remote) = pair();
        let lowest_version =
            |l: &Change, r: &Change, _: Option<&[u8]>| -> Result<Change, ConflictError> {
                Ok(if l.version <= r.version { l.clone() } else { r.clone() })
            };
        assert_eq!(lowest_version.resolve(&local, &remote, None).unwrap().version, 2);
    }
}
