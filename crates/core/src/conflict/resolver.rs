//! Conflict resolution with a registry of named strategies.
//!
//! A [`ConflictResolver`] owns its registry: it is populated with the
//! built-in strategies at construction and guarded by a read-write lock,
//! so lookups from many threads can run alongside runtime registration.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, warn};

use super::detector::{Conflict, ConflictDetector};
use super::strategy::{
    LocalWins, MergeContent, NewestWins, RemoteWins, ResolutionStrategy, Strategy, TieBreak,
};
use crate::config::ConflictConfig;
use crate::errors::ConflictError;
use crate::models::Change;

type Registry = HashMap<String, Arc<dyn ResolutionStrategy>>;

/// Resolves conflicting changes using named strategies.
pub struct ConflictResolver {
    default_strategy: Strategy,
    strategies: RwLock<Registry>,
}

impl ConflictResolver {
    /// Create a resolver with the built-in strategies and the given default.
    pub fn new(default_strategy: impl Into<Strategy>) -> Self {
        Self::with_options(default_strategy, TieBreak::default(), false)
    }

    /// Create a resolver with explicit options for the built-ins.
    pub fn with_options(
        default_strategy: impl Into<Strategy>,
        tie_break: TieBreak,
        line_merge: bool,
    ) -> Self {
        let mut registry: Registry = HashMap::new();
        registry.insert(Strategy::LocalWins.to_string(), Arc::new(LocalWins));
        registry.insert(Strategy::RemoteWins.to_string(), Arc::new(RemoteWins));
        registry.insert(Strategy::NewestWins.to_string(), Arc::new(NewestWins { tie_break }));
        registry.insert(Strategy::Merge.to_string(), Arc::new(MergeContent { line_merge }));

        let default_strategy = default_strategy.into();
        debug!(default = %default_strategy, ?tie_break, line_merge, "conflict resolver ready");
        Self {
            default_strategy,
            strategies: RwLock::new(registry),
        }
    }

    /// Create a resolver from the `[conflict]` config section.
    pub fn from_config(config: &ConflictConfig) -> Self {
        Self::with_options(
            config.default_strategy.as_str(),
            config.tie_break,
            config.line_merge,
        )
    }

    /// The strategy used when a call names none.
    pub fn default_strategy(&self) -> &Strategy {
        &self.default_strategy
    }

    /// Add or replace a named strategy.
    pub fn register_strategy(
        &self,
        name: impl Into<String>,
        strategy: impl ResolutionStrategy + 'static,
    ) {
        let name = name.into();
        let replaced = self
            .strategies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), Arc::new(strategy))
            .is_some();
        info!(strategy = %name, replaced, "registered conflict strategy");
    }

    /// Whether a strategy is registered under `name`.
    pub fn has_strategy(&self, name: &str) -> bool {
        self.strategies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Registered strategy names, sorted.
    pub fn strategies(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .strategies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Flag whether two changes conflict. See [`ConflictDetector::detect`].
    pub fn detect_conflict(&self, local: &Change, remote: &Change) -> Option<Conflict> {
        ConflictDetector::detect(local, remote)
    }

    /// Resolve with the default strategy and no known ancestor.
    pub fn resolve(&self, local: &Change, remote: &Change) -> Result<Change, ConflictError> {
        self.resolve_with_base(local, remote, None, None)
    }

    /// Resolve with a named strategy and no known ancestor.
    pub fn resolve_conflict(
        &self,
        local: &Change,
        remote: &Change,
        strategy: &Strategy,
    ) -> Result<Change, ConflictError> {
        self.resolve_with_base(local, remote, None, Some(strategy))
    }

    /// Resolve two changes to the same file.
    ///
    /// `base` is the common ancestor content, used by content-merging
    /// strategies. `strategy` falls back to the resolver's default. An
    /// unregistered name is an error, never silently replaced.
    pub fn resolve_with_base(
        &self,
        local: &Change,
        remote: &Change,
        base: Option<&[u8]>,
        strategy: Option<&Strategy>,
    ) -> Result<Change, ConflictError> {
        local.validate()?;
        remote.validate()?;
        if local.file_id != remote.file_id {
            return Err(ConflictError::InvalidChange(format!(
                "changes target different files ('{}' and '{}')",
                local.file_id, remote.file_id
            )));
        }

        let strategy = strategy.unwrap_or(&self.default_strategy);
        let implementation = self
            .strategies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(strategy.as_str())
            .cloned()
            .ok_or_else(|| ConflictError::UnknownStrategy(strategy.to_string()))?;

        // The lock is released here, so strategies may register others.
        match implementation.resolve(local, remote, base) {
            Ok(resolved) => {
                info!(
                    file_id = %local.file_id,
                    strategy = %strategy,
                    version = resolved.version,
                    "conflict resolved"
                );
                Ok(resolved)
            }
            Err(e) => {
                warn!(
                    file_id = %local.file_id,
                    strategy = %strategy,
                    error = %e,
                    "conflict not resolved"
                );
                Err(e)
            }
        }
    }
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new(Strategy::NewestWins)
    }
}

impl std::fmt::Debug for ConflictResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConflictResolver")
            .field("default_strategy", &self.default_strategy)
            .field("strategies", &self.strategies())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChangeType;
    use chrono::{Duration, Utc};

    fn pair() -> (Change, Change) {
        let now = Utc::now();
        let local = Change::new("file-1", ChangeType::Update, "/doc.txt", now, 4);
        let later = now + Duration::seconds(30);
        let remote = Change::new("file-1", ChangeType::Update, "/doc.txt", later, 5);
        (local, remote)
    }

    #[test]
    fn test_builtins_registered() {
        let resolver = ConflictResolver::new("local_wins");
        assert_eq!(
            resolver.strategies(),
            vec!["local_wins", "merge", "newest_wins", "remote_wins"]
        );
        assert_eq!(resolver.default_strategy(), &Strategy::LocalWins);
    }

    #[test]
    fn test_register_on_fresh_resolver() {
        let resolver = ConflictResolver::new(Strategy::NewestWins);
        resolver.register_strategy(
            "custom",
            |_: &Change, r: &Change, _: Option<&[u8]>| -> Result<Change, ConflictError> {
                Ok(r.clone())
            },
        );
        assert!(resolver.has_strategy("custom"));

        let (local, remote) = pair();
        let resolved = resolver
            .resolve_conflict(&local, &remote, &"custom".into())
            .unwrap();
        assert_eq!(resolved, remote);
    }

    #[test]
    fn test_register_replaces_builtin() {
        let resolver = ConflictResolver::default();
        resolver.register_strategy("newest_wins", LocalWins);
        let (local, remote) = pair();
        let resolved = resolver
            .resolve_conflict(&local, &remote, &Strategy::NewestWins)
            .unwrap();
        assert_eq!(resolved, local);
    }

    #[test]
    fn test_local_wins() {
        let resolver = ConflictResolver::default();
        let (local, remote) = pair();
        let resolved = resolver
            .resolve_conflict(&local, &remote, &Strategy::LocalWins)
            .unwrap();
        assert_eq!(resolved, local);
    }

    #[test]
    fn test_newest_wins() {
        let resolver = ConflictResolver::default();
        let (local, remote) = pair();
        assert_eq!(
            resolver
                .resolve_conflict(&local, &remote, &Strategy::NewestWins)
                .unwrap(),
            remote
        );
        assert_eq!(
            resolver
                .resolve_conflict(&remote, &local, &Strategy::NewestWins)
                .unwrap(),
            remote
        );
    }

    #[test]
    fn test_default_strategy_used() {
        let resolver = ConflictResolver::new("local_wins");
        let (local, remote) = pair();
        assert_eq!(resolver.resolve(&local, &remote).unwrap(), local);
    }

    #[test]
    fn test_unknown_strategy() {
        let resolver = ConflictResolver::default();
        let (local, remote) = pair();
        let err = resolver
            .resolve_conflict(&local, &remote, &"coin_flip".into())
            .unwrap_err();
        assert!(matches!(err, ConflictError::UnknownStrategy(ref name) if name == "coin_flip"));
    }

    #[test]
    fn test_unknown_default_strategy_is_not_substituted() {
        let resolver = ConflictResolver::new("coin_flip");
        let (local, remote) = pair();
        assert!(matches!(
            resolver.resolve(&local, &remote),
            Err(ConflictError::UnknownStrategy(_))
        ));
    }

    #[test]
    fn test_merge_strategy_with_base() {
        let resolver = ConflictResolver::default();
        let (local, remote) = pair();
        let local = local.with_content(b"local edit".to_vec());
        let remote = remote.with_content(b"original".to_vec());
        let resolved = resolver
            .resolve_with_base(
                &local,
                &remote,
                Some(b"original".as_slice()),
                Some(&Strategy::Merge),
            )
            .unwrap();
        assert_eq!(resolved, local);
    }

    #[test]
    fn test_merge_strategy_divergent() {
        let resolver = ConflictResolver::default();
        let (local, remote) = pair();
        let local = local.with_content(b"local edit".to_vec());
        let remote = remote.with_content(b"remote edit".to_vec());
        let err = resolver
            .resolve_with_base(
                &local,
                &remote,
                Some(b"original".as_slice()),
                Some(&Strategy::Merge),
            )
            .unwrap_err();
        assert!(err.is_unresolvable());
    }

    #[test]
    fn test_rejects_empty_file_id() {
        let resolver = ConflictResolver::default();
        let (mut local, mut remote) = pair();
        local.file_id.clear();
        remote.file_id.clear();
        assert!(matches!(
            resolver.resolve(&local, &remote),
            Err(ConflictError::InvalidChange(_))
        ));
    }

    #[test]
    fn test_rejects_different_files() {
        let resolver = ConflictResolver::default();
        let (local, mut remote) = pair();
        remote.file_id = "file-2".into();
        assert!(matches!(
            resolver.resolve(&local, &remote),
            Err(ConflictError::InvalidChange(_))
        ));
    }

    #[test]
    fn test_from_config() {
        let config = ConflictConfig {
            default_strategy: "merge".into(),
            tie_break: TieBreak::PreferRemote,
            line_merge: true,
        };
        let resolver = ConflictResolver::from_config(&config);
        assert_eq!(resolver.default_strategy(), &Strategy::Merge);

        let (local, mut remote) = pair();
        remote.timestamp = local.timestamp;
        remote.version = 1;
        let resolved = resolver
            .resolve_conflict(&local, &remote, &Strategy::NewestWins)
            .unwrap();
        assert_eq!(resolved, remote);
    }

    #[test]
    fn test_detect_conflict() {
        let resolver = ConflictResolver::default();
        let (local, remote) = pair();
        assert!(resolver.detect_conflict(&local, &remote).is_some());
    }
}
