//! Manifest engine (§4.3): walk a directory, compute per-file content
//! digests, and diff a client manifest against a server manifest.
//!
//! Kept free of sockets and session state so it can be exercised with
//! nothing but a temp directory.

pub mod diff;
pub mod manifest;

pub use diff::{apply_deletions, diff, DeletionOutcome, Diff};
pub use manifest::{build, from_json, to_json, Manifest, DIR_SENTINEL};
