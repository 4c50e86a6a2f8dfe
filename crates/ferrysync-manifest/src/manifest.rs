//! `build(base)`: recursive traversal of `base`, mapping each descendant's
//! POSIX-normalized relative path to either the directory sentinel or the
//! hex MD5 digest of its full contents (§4.3).
//!
//! MD5 is read in 4096-byte chunks rather than loaded whole, mirroring the
//! reference client's `calculate_md5` — large files under `ROOT` shouldn't
//! need to fit in memory twice.

use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::Path;

use md5::{Digest, Md5};
use thiserror::Error;
use tracing::warn;

pub use ferrysync_core::types::DIR_SENTINEL;

/// Ordered mapping from POSIX-normalized relative path to either
/// [`DIR_SENTINEL`] or a hex content digest. A `BTreeMap` gives
/// deterministic iteration order for free, though the spec only requires
/// set-of-entries equality.
pub type Manifest = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("reading base directory {0}: {1}")]
    BaseUnreadable(String, std::io::Error),
    #[error("serializing manifest: {0}")]
    Serialize(#[from] serde_json::Error),
}

const MD5_CHUNK: usize = 4096;

/// Walk `base` recursively, skipping unreadable entries with a logged
/// diagnostic rather than failing the whole walk.
pub fn build(base: &Path) -> Result<Manifest, ManifestError> {
    let mut manifest = Manifest::new();
    if !base.exists() {
        return Ok(manifest);
    }
    walk(base, base, &mut manifest)
        .map_err(|e| ManifestError::BaseUnreadable(base.display().to_string(), e))?;
    Ok(manifest)
}

fn walk(base: &Path, dir: &Path, manifest: &mut Manifest) -> std::io::Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "manifest: skipping unreadable directory");
            return Ok(());
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "manifest: skipping unreadable entry");
                continue;
            }
        };
        let path = entry.path();
        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "manifest: skipping entry with unreadable type");
                continue;
            }
        };

        let rel = posix_relative(base, &path);

        if file_type.is_dir() {
            manifest.insert(rel, DIR_SENTINEL.to_string());
            walk(base, &path, manifest)?;
        } else if file_type.is_file() {
            match hash_file(&path) {
                Ok(digest) => {
                    manifest.insert(rel, digest);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "manifest: skipping unreadable file");
                }
            }
        }
        // Symlinks and other special files are neither a directory nor a
        // regular file from the traversal's point of view; skip silently.
    }
    Ok(())
}

fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; MD5_CHUNK];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex_digest(&hasher.finalize()))
}

fn hex_digest(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(out, "{b:02x}").unwrap();
    }
    out
}

/// Normalize `path`'s position relative to `base` to a `/`-separated
/// string, regardless of host path separator.
fn posix_relative(base: &Path, path: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Serialize a manifest as the JSON object the sync protocol carries in
/// `SYNC_CHUNK` bodies.
pub fn to_json(manifest: &Manifest) -> Result<String, ManifestError> {
    Ok(serde_json::to_string(manifest)?)
}

/// Parse a manifest from the JSON object a client's `SYNC_CHUNK` stream
/// concatenates to.
pub fn from_json(text: &str) -> Result<Manifest, serde_json::Error> {
    serde_json::from_str(text)
}
