//! Three-way content merge.
//!
//! [`three_way_merge`] is strict: it only resolves the cases where at most
//! one side really changed the content (or both made the identical change).
//! [`line_merge`] additionally uses the `diffy` crate to combine edits that
//! touch different lines.

use tracing::debug;

use crate::errors::MergeConflict;

/// Merge `local` and `remote` against their common ancestor `base`.
///
/// - `local == base`: remote's edit is taken.
/// - `remote == base`: local's edit is taken.
/// - `local == remote`: both made the same edit.
/// - otherwise: [`MergeConflict`], never a silent pick of one side.
pub fn three_way_merge(base: &[u8], local: &[u8], remote: &[u8]) -> Result<Vec<u8>, MergeConflict> {
    if let Some(merged) = trivial_merge(base, local, remote) {
        return Ok(merged);
    }

    debug!("local and remote diverge from base");
    Err(MergeConflict {
        reason: "local and remote both changed the content differently".into(),
        conflicted: None,
    })
}

/// Like [`three_way_merge`], but divergent edits to different lines are
/// combined. Overlapping edits fail with the marker-annotated output
/// attached to the error.
pub fn line_merge(base: &[u8], local: &[u8], remote: &[u8]) -> Result<Vec<u8>, MergeConflict> {
    if let Some(merged) = trivial_merge(base, local, remote) {
        return Ok(merged);
    }

    match diffy::merge_bytes(base, local, remote) {
        Ok(merged) => {
            debug!(bytes = merged.len(), "clean line-level merge");
            Ok(merged)
        }
        Err(conflicted) => {
            debug!("line-level merge left conflict markers");
            Err(MergeConflict {
                reason: "local and remote edited overlapping lines".into(),
                conflicted: Some(conflicted),
            })
        }
    }
}

fn trivial_merge(base: &[u8], local: &[u8], remote: &[u8]) -> Option<Vec<u8>> {
    if local == base {
        debug!("local == base, remote wins cleanly");
        return Some(remote.to_vec());
    }
    if remote == base {
        debug!("remote == base, local wins cleanly");
        return Some(local.to_vec());
    }
    if local == remote {
        debug!("local == remote, identical changes");
        return Some(local.to_vec());
    }
    None
}
