//! Durable turn-history storage: one named JSON document on disk.
//!
//! The contract is deliberately a single serialized entry — written whole on
//! every history mutation, read once at startup, removed on clear — not a
//! row store.

use std::fs;
use std::path::{Path, PathBuf};

use crate::conversation::Turn;
use crate::error::{ConfabError, Result};

/// File name of the persisted history document.
const HISTORY_FILE: &str = "history.json";

#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    /// Store backed by an explicit file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the platform default location.
    pub fn at_default_path() -> Self {
        Self::new(default_data_dir().join(HISTORY_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted history. A missing file is an empty history.
    pub fn load(&self) -> Result<Vec<Turn>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ConfabError::Storage(e.to_string())),
        };
        serde_json::from_str(&raw).map_err(|e| ConfabError::Storage(e.to_string()))
    }

    /// Replace the persisted history with `turns`.
    pub fn save(&self, turns: &[Turn]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfabError::Storage(e.to_string()))?;
        }
        let raw =
            serde_json::to_string_pretty(turns).map_err(|e| ConfabError::Storage(e.to_string()))?;
        fs::write(&self.path, raw).map_err(|e| ConfabError::Storage(e.to_string()))
    }

    /// Remove the persisted document. Missing file is a no-op.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ConfabError::Storage(e.to_string())),
        }
    }
}

/// Platform data directory for Confab.
pub fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Confab")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("confab")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Role;

    #[test]
    fn save_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("history.json"));

        let turns = vec![
            Turn::now(Role::User, "hello"),
            Turn::now(Role::Agent, "hi there"),
        ];
        store.save(&turns).unwrap();
        assert_eq!(store.load().unwrap(), turns);
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("nope.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn clear_removes_file_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("history.json"));
        store.save(&[Turn::now(Role::User, "x")]).unwrap();
        store.clear().unwrap();
        assert!(!store.path().exists());
        store.clear().unwrap();
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("nested/deep/history.json"));
        store.save(&[]).unwrap();
        assert!(store.path().exists());
    }
}
