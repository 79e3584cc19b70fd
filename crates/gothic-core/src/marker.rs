//! Persisted "previously signed in" marker.
//!
//! Only the presence of the key matters. The stored value is informational.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use parking_lot::Mutex;

use crate::provider::MarkerStore;

/// Key under which a completed sign-in is recorded
pub const RECOGNITION_KEY: &str = "gothic-id";

/// Value written alongside the key
pub const RECOGNITION_VALUE: &str = "loaded";

/// Stores each marker as a file named after its key.
pub struct FileMarkerStore {
    dir: PathBuf,
}

impl FileMarkerStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn marker_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl MarkerStore for FileMarkerStore {
    fn has(&self, key: &str) -> bool {
        self.marker_path(key).exists()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create marker directory: {}", self.dir.display()))?;
        std::fs::write(self.marker_path(key), value)
            .with_context(|| format!("Failed to write marker: {}", key))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.marker_path(key);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove marker: {}", key))?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryMarkerStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryMarkerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_marker(key: &str, value: &str) -> Self {
        let store = Self::default();
        store.entries.lock().insert(key.to_string(), value.to_string());
        store
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }
}

impl MarkerStore for MemoryMarkerStore {
    fn has(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}
