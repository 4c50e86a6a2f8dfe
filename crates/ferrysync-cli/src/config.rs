//! Persisted client-side sync configuration: `sync_config.json` maps
//! small numeric ids to `{local_path, remote_path}` pairs (§6).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "sync_config.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncPair {
    pub local_path: PathBuf,
    pub remote_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pairs: BTreeMap<u32, SyncPair>,
}

impl ClientConfig {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
        serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("parsing {}: {e}", path.display()))
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(Path::new(CONFIG_FILE))
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .map_err(|e| anyhow::anyhow!("writing {}: {e}", path.display()))?;
        Ok(())
    }

    pub fn pairs(&self) -> impl Iterator<Item = (u32, &SyncPair)> {
        self.pairs.iter().map(|(id, pair)| (*id, pair))
    }

    pub fn add(&mut self, local_path: PathBuf, remote_path: String) -> u32 {
        let id = self.pairs.keys().next_back().map_or(1, |max| max + 1);
        self.pairs.insert(id, SyncPair { local_path, remote_path });
        id
    }

    pub fn remove(&mut self, id: u32) -> Option<SyncPair> {
        self.pairs.remove(&id)
    }

    pub fn get(&self, id: u32) -> Option<&SyncPair> {
        self.pairs.get(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn add_assigns_increasing_ids() {
        let mut config = ClientConfig::default();
        let a = config.add(PathBuf::from("a"), "remote/a".to_string());
        let b = config.add(PathBuf::from("b"), "remote/b".to_string());
        assert_eq!(a, 1);
        assert_eq!(b, 2);
    }

    #[test]
    fn remove_then_add_reuses_next_after_max() {
        let mut config = ClientConfig::default();
        config.add(PathBuf::from("a"), "remote/a".to_string());
        let b = config.add(PathBuf::from("b"), "remote/b".to_string());
        config.remove(b);
        let c = config.add(PathBuf::from("c"), "remote/c".to_string());
        assert_eq!(c, b);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sync_config.json");
        let mut config = ClientConfig::default();
        config.add(PathBuf::from("/tmp/photos"), "photos".to_string());

        config.save_to(&path).unwrap();
        let loaded = ClientConfig::load_from(&path).unwrap();
        assert_eq!(loaded.get(1), config.get(1));
    }

    #[test]
    fn load_missing_file_is_empty_config() {
        let config = ClientConfig::load_from(Path::new("/nonexistent/sync_config.json")).unwrap();
        assert_eq!(config.pairs().count(), 0);
    }
}
