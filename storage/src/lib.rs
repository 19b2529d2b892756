//! Fountain Storage Layer - File-Based State Snapshots
//!
//! The engine keeps its ledger and fee state in memory; this crate persists
//! point-in-time snapshots of that state:
//! - JSON alongside bincode, so operators can read what was saved
//! - Bincode loaded first for speed, JSON as the fallback
//! - One file pair per named snapshot

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),
}

/// File-based store for named state snapshots
pub struct SnapshotStore {
    data_dir: PathBuf,
}

impl SnapshotStore {
    /// Open the snapshot directory, creating it if needed
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let data_dir = path.as_ref().to_path_buf();
        if !data_dir.exists() {
            fs::create_dir_all(&data_dir)?;
        }
        Ok(Self { data_dir })
    }

    fn json_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", name))
    }

    fn bin_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{}.bin", name))
    }

    /// Write a snapshot under `name`, in both encodings
    pub fn save<T: Serialize>(&self, name: &str, state: &T) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| StorageError::EncodingError(e.to_string()))?;
        fs::write(self.json_path(name), json)?;

        let bin =
            bincode::serialize(state).map_err(|e| StorageError::EncodingError(e.to_string()))?;
        fs::write(self.bin_path(name), bin)?;

        Ok(())
    }

    /// Load the snapshot saved under `name`, preferring the binary form
    pub fn load<T: for<'de> Deserialize<'de>>(&self, name: &str) -> Result<T, StorageError> {
        let bin_path = self.bin_path(name);
        if bin_path.exists() {
            let bytes = fs::read(&bin_path)?;
            return bincode::deserialize(&bytes)
                .map_err(|e| StorageError::EncodingError(e.to_string()));
        }

        let json_path = self.json_path(name);
        if json_path.exists() {
            let text = fs::read_to_string(&json_path)?;
            return serde_json::from_str(&text)
                .map_err(|e| StorageError::EncodingError(e.to_string()));
        }

        Err(StorageError::SnapshotNotFound(name.to_string()))
    }

    /// Whether a snapshot exists under `name`, in either encoding
    pub fn exists(&self, name: &str) -> bool {
        self.bin_path(name).exists() || self.json_path(name).exists()
    }

    /// Names of every stored snapshot
    pub fn list(&self) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.data_dir)? {
            let path = entry?.path();
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                if !names.iter().any(|existing| existing == stem) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Remove both encodings of a snapshot
    pub fn delete(&self, name: &str) -> Result<(), StorageError> {
        let bin_path = self.bin_path(name);
        if bin_path.exists() {
            fs::remove_file(bin_path)?;
        }
        let json_path = self.json_path(name);
        if json_path.exists() {
            fs::remove_file(json_path)?;
        }
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}
