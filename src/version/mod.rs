//! Version & Branch Lifecycle
//!
//! One manifest holds the authoritative version. A bump picks the next
//! version whose release branch and pull request are both unused, writes it
//! to the manifest, and mirrors it into the changelog and README.

mod branch;
pub mod changelog;
mod manager;

pub use branch::{ensure_branch, BranchAction};
pub use manager::{BumpKind, VersionManager};
