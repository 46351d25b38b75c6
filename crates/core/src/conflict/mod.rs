//! Sync conflict detection, three-way merging, and resolution.
//!
//! The conflict subsystem is responsible for:
//! 1. **Detection** -- flagging two changes that target the same file.
//! 2. **Merging** -- three-way merging of file content against its ancestor.
//! 3. **Resolution** -- picking the authoritative change with a named strategy.

pub mod detector;
pub mod merger;
pub mod resolver;
pub mod strategy;

pub use detector::{Conflict, ConflictDetector, ConflictType};
pub use merger::{line_merge, three_way_merge};
pub use resolver::ConflictResolver;
pub use strategy::{ResolutionStrategy, Strategy, TieBreak};
