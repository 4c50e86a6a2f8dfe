//! `diff(client, server)` (§4.3): classify entries into `to_delete` and
//! `to_fetch`, and `apply_deletions` to execute the deletion half
//! depth-first against the filesystem.

use std::fs;
use std::path::Path;

use tracing::warn;

use crate::manifest::{Manifest, DIR_SENTINEL};

/// Result of comparing a client manifest (authoritative) against a server
/// manifest (current state).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    /// Keys present only on the server — candidates for deletion.
    pub to_delete: Vec<String>,
    /// Keys the client has as a file and the server is missing or stale
    /// on. Never contains a directory entry.
    pub to_fetch: Vec<String>,
}

/// Compare `client` against `server`. Directories are never placed in
/// `to_fetch` — only `to_delete` (if the server has a directory the
/// client no longer lists) can contain them.
pub fn diff(client: &Manifest, server: &Manifest) -> Diff {
    let mut to_delete = Vec::new();
    let mut to_fetch = Vec::new();

    for (path, server_digest) in server {
        if !client.contains_key(path) {
            to_delete.push(path.clone());
        }
        let _ = server_digest;
    }

    for (path, client_digest) in client {
        if client_digest == DIR_SENTINEL {
            continue;
        }
        match server.get(path) {
            None => to_fetch.push(path.clone()),
            Some(server_digest) => {
                if server_digest != DIR_SENTINEL && server_digest != client_digest {
                    to_fetch.push(path.clone());
                }
                // A server-side directory entry with the same path as a
                // client file is left to the filesystem deletion pass to
                // sort out; it cannot be silently overwritten here.
            }
        }
    }

    Diff { to_delete, to_fetch }
}

/// What happened to one `to_delete` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionOutcome {
    FileRemoved(String),
    DirRemoved(String),
    /// A directory in `to_delete` was not empty after its file entries
    /// were removed, so it was retained.
    DirRetained(String),
    /// The path no longer existed (already gone, or never materialized).
    Missing(String),
    Failed(String, String),
}

/// Execute the deletion side of a diff against `base`, deepest path
/// first, so a directory is only ever removed after its descendants.
/// A directory is removed only if it is empty afterward; otherwise it is
/// retained with a diagnostic.
pub fn apply_deletions(base: &Path, to_delete: &[String]) -> Vec<DeletionOutcome> {
    let mut ordered: Vec<&String> = to_delete.iter().collect();
    // Deepest first: more path separators sorts first; ties broken by
    // length so "a/bb" precedes "a/b" deterministically either way.
    ordered.sort_by_key(|p| std::cmp::Reverse((p.matches('/').count(), p.len())));

    let mut outcomes = Vec::with_capacity(ordered.len());
    for rel in ordered {
        let target = base.join(rel);
        let outcome = if !target.exists() {
            DeletionOutcome::Missing(rel.clone())
        } else if target.is_dir() {
            match fs::remove_dir(&target) {
                Ok(()) => DeletionOutcome::DirRemoved(rel.clone()),
                Err(_) => {
                    warn!(path = %target.display(), "manifest: directory not empty after deletions, retaining");
                    DeletionOutcome::DirRetained(rel.clone())
                }
            }
        } else {
            match fs::remove_file(&target) {
                Ok(()) => DeletionOutcome::FileRemoved(rel.clone()),
                Err(e) => {
                    warn!(path = %target.display(), error = %e, "manifest: failed to delete");
                    DeletionOutcome::Failed(rel.clone(), e.to_string())
                }
            }
        };
        outcomes.push(outcome);
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::build;
    use tempfile::tempdir;

    fn manifest_of(pairs: &[(&str, &str)]) -> Manifest {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn identical_manifests_produce_empty_diff() {
        let m = manifest_of(&[("x", "h1")]);
        let d = diff(&m, &m);
        assert!(d.to_delete.is_empty());
        assert!(d.to_fetch.is_empty());
    }

    #[test]
    fn server_only_file_is_deleted() {
        let client = manifest_of(&[("x", "h1")]);
        let server = manifest_of(&[("x", "h1"), ("y", "h2")]);
        let d = diff(&client, &server);
        assert_eq!(d.to_delete, vec!["y".to_string()]);
        assert!(d.to_fetch.is_empty());
    }

    #[test]
    fn client_only_file_is_fetched() {
        let client = manifest_of(&[("x", "h1")]);
        let server = Manifest::new();
        let d = diff(&client, &server);
        assert_eq!(d.to_fetch, vec!["x".to_string()]);
        assert!(d.to_delete.is_empty());
    }

    #[test]
    fn differing_digests_trigger_fetch() {
        let client = manifest_of(&[("x", "h1")]);
        let server = manifest_of(&[("x", "h2")]);
        let d = diff(&client, &server);
        assert_eq!(d.to_fetch, vec!["x".to_string()]);
    }

    #[test]
    fn directories_never_placed_in_fetch() {
        let client = manifest_of(&[("dir", DIR_SENTINEL)]);
        let server = Manifest::new();
        let d = diff(&client, &server);
        assert!(d.to_fetch.is_empty());
    }

    #[test]
    fn s6_scenario_matches_spec() {
        // Client has {x:H1}; server has {x:H1, y:H2}. After sync, server
        // should have {x:H1} and no fetches are needed.
        let client = manifest_of(&[("x", "H1")]);
        let server = manifest_of(&[("x", "H1"), ("y", "H2")]);
        let d = diff(&client, &server);
        assert_eq!(d.to_delete, vec!["y".to_string()]);
        assert!(d.to_fetch.is_empty());
    }

    #[test]
    fn apply_deletions_removes_depth_first() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("a/b/f.txt"), b"x").unwrap();

        let to_delete = vec![
            "a".to_string(),
            "a/b".to_string(),
            "a/b/f.txt".to_string(),
        ];
        let outcomes = apply_deletions(dir.path(), &to_delete);

        assert!(!dir.path().join("a").exists());
        assert!(outcomes
            .iter()
            .any(|o| matches!(o, DeletionOutcome::FileRemoved(p) if p == "a/b/f.txt")));
        assert!(outcomes
            .iter()
            .any(|o| matches!(o, DeletionOutcome::DirRemoved(p) if p == "a/b")));
        assert!(outcomes
            .iter()
            .any(|o| matches!(o, DeletionOutcome::DirRemoved(p) if p == "a")));
    }

    #[test]
    fn apply_deletions_retains_nonempty_dir() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::write(dir.path().join("a/keep.txt"), b"x").unwrap();

        let outcomes = apply_deletions(dir.path(), &["a".to_string()]);
        assert!(dir.path().join("a").exists());
        assert!(matches!(outcomes[0], DeletionOutcome::DirRetained(_)));
    }

    #[test]
    fn apply_deletions_missing_path_is_noop() {
        let dir = tempdir().unwrap();
        let outcomes = apply_deletions(dir.path(), &["ghost.txt".to_string()]);
        assert!(matches!(outcomes[0], DeletionOutcome::Missing(_)));
    }

    #[test]
    fn convergence_end_to_end() {
        // Property 5: after applying the diff's deletions, the server
        // tree's relative paths equal the client's file set.
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("keep.txt"), b"k").unwrap();
        fs::write(dir.path().join("drop.txt"), b"d").unwrap();

        let server_before = build(dir.path()).unwrap();
        let client = manifest_of(&[("keep.txt", &server_before["keep.txt"])]);

        let d = diff(&client, &server_before);
        apply_deletions(dir.path(), &d.to_delete);

        let server_after = build(dir.path()).unwrap();
        assert_eq!(server_after.len(), 1);
        assert!(server_after.contains_key("keep.txt"));
        assert!(d.to_fetch.is_empty());
    }
}
