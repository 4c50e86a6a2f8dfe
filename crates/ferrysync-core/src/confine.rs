//! Path confinement: every incoming client path is resolved and checked
//! against a fixed root before any filesystem operation touches it.
//!
//! Two confinement checks are exposed because the dispatcher needs both:
//! `resolve_existing` canonicalizes (following symlinks) for operations on
//! objects that must already exist (`CD`, `DOWNLOAD`), while
//! `resolve_for_create` only normalizes lexically — the target doesn't
//! exist yet (`SUPLOAD_STRUCTURE`, sync target directories) — but still
//! verifies the nearest existing ancestor is inside the root, so a
//! symlink planted under an existing directory can't be used to escape.

use std::path::{Component, Path, PathBuf};

use crate::error::{FerrysyncError, FerrysyncResult};

#[derive(Debug, Clone)]
pub struct Confinement {
    root: PathBuf,
}

impl Confinement {
    /// Canonicalize `root` once at startup. `root` must already exist.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().canonicalize()?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join `input` onto `current_dir` (or onto the root if `input` looks
    /// absolute) and fold `.`/`..` components lexically. Does not touch
    /// the filesystem.
    pub fn join_lexical(&self, current_dir: &Path, input: &str) -> PathBuf {
        let base = if input.starts_with('/') {
            self.root.clone()
        } else {
            current_dir.to_path_buf()
        };
        let joined = base.join(input.trim_start_matches('/'));
        normalize_lexical(&joined)
    }

    /// Resolve `input` relative to `current_dir` for an operation whose
    /// target must already exist on disk (symlinks are followed and
    /// checked). Fails with `InvalidPath` if the result is not the root
    /// or a descendant.
    pub fn resolve_existing(&self, current_dir: &Path, input: &str) -> FerrysyncResult<PathBuf> {
        let candidate = self.join_lexical(current_dir, input);
        let canonical = candidate
            .canonicalize()
            .map_err(|_| FerrysyncError::InvalidPath(format!("no such path: {input}")))?;
        self.check_contains(&canonical, input)?;
        Ok(canonical)
    }

    /// Resolve `input` relative to `current_dir` for an operation that may
    /// create the target. Only lexical normalization is applied to the
    /// target itself, but the nearest existing ancestor is canonicalized
    /// and checked so a symlinked ancestor cannot be used to break out.
    pub fn resolve_for_create(&self, current_dir: &Path, input: &str) -> FerrysyncResult<PathBuf> {
        let candidate = self.join_lexical(current_dir, input);
        self.check_contains(&candidate, input)?;

        let mut ancestor = candidate.as_path();
        loop {
            if ancestor.exists() {
                let canonical_ancestor = ancestor
                    .canonicalize()
                    .map_err(|_| FerrysyncError::InvalidPath(format!("unreadable ancestor of {input}")))?;
                self.check_contains(&canonical_ancestor, input)?;
                break;
            }
            match ancestor.parent() {
                Some(parent) => ancestor = parent,
                None => break,
            }
        }
        Ok(candidate)
    }

    fn check_contains(&self, candidate: &Path, input: &str) -> FerrysyncResult<()> {
        if candidate == self.root || candidate.starts_with(&self.root) {
            Ok(())
        } else {
            Err(FerrysyncError::InvalidPath(format!(
                "escapes root: {input}"
            )))
        }
    }

    /// The client-visible relative path of an absolute confined path
    /// (empty string for the root itself), POSIX-normalized.
    pub fn relative_display(&self, absolute: &Path) -> String {
        absolute
            .strip_prefix(&self.root)
            .unwrap_or(absolute)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

/// Fold `.` and `..` path components without touching the filesystem,
/// mirroring Python's `os.path.normpath` / the spec's "folded" language.
fn normalize_lexical(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    // Already at (or above) the filesystem root; drop the
                    // extra `..` rather than producing a bogus path. The
                    // containment check below will reject any result that
                    // doesn't land back inside the confinement root.
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rejects_ascent_past_root() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let confinement = Confinement::new(dir.path()).unwrap();
        let sub = confinement.root().join("sub");

        let err = confinement
            .resolve_existing(&sub, "../../../../etc")
            .unwrap_err();
        assert!(matches!(err, FerrysyncError::InvalidPath(_)));
    }

    #[test]
    fn accepts_descendant() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let confinement = Confinement::new(dir.path()).unwrap();
        let root = confinement.root().to_path_buf();

        let resolved = confinement.resolve_existing(&root, "sub").unwrap();
        assert_eq!(resolved, root.join("sub"));
    }

    #[test]
    fn resolve_for_create_allows_new_nested_dirs() {
        let dir = tempdir().unwrap();
        let confinement = Confinement::new(dir.path()).unwrap();
        let root = confinement.root().to_path_buf();

        let target = confinement
            .resolve_for_create(&root, "a/b/c")
            .unwrap();
        assert_eq!(target, root.join("a/b/c"));
    }

    #[test]
    fn resolve_for_create_rejects_escape() {
        let dir = tempdir().unwrap();
        let confinement = Confinement::new(dir.path()).unwrap();
        let root = confinement.root().to_path_buf();

        let err = confinement
            .resolve_for_create(&root, "../outside")
            .unwrap_err();
        assert!(matches!(err, FerrysyncError::InvalidPath(_)));
    }

    #[test]
    fn relative_display_is_posix_normalized() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        let confinement = Confinement::new(dir.path()).unwrap();
        let p = confinement.root().join("a").join("b");
        assert_eq!(confinement.relative_display(&p), "a/b");
    }
}
