//! Shared settings handle
//!
//! Readers take an `Arc<GroveConfig>` snapshot and never see a half-applied
//! update; writers build a new structure and swap it in whole.

use super::grove::{ConfigUpdate, GroveConfig, GROVE_CONFIG_FILE};
use crate::storage::JsonStore;
use crate::Result;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

/// Read-mostly settings shared between the engine and its callers
#[derive(Debug)]
pub struct ConfigStore {
    current: RwLock<Arc<GroveConfig>>,
    persist: Option<JsonStore>,
}

impl ConfigStore {
    /// Settings that live only in memory
    pub fn in_memory(config: GroveConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
            persist: None,
        }
    }

    /// Load settings from `store`, writing defaults when no file exists yet
    pub fn open(store: JsonStore) -> Result<Self> {
        let config = match store.load_optional::<GroveConfig>(GROVE_CONFIG_FILE)? {
            Some(config) => {
                debug!("Loaded settings from {}", store.file_path(GROVE_CONFIG_FILE).display());
                config
            }
            None => {
                let config = GroveConfig::default();
                store.save(GROVE_CONFIG_FILE, &config)?;
                info!(
                    "Created default settings at {}",
                    store.file_path(GROVE_CONFIG_FILE).display()
                );
                config
            }
        };

        Ok(Self {
            current: RwLock::new(Arc::new(config)),
            persist: Some(store),
        })
    }

    /// Load from the global settings directory
    pub fn open_global() -> Result<Self> {
        Self::open(JsonStore::global()?)
    }

    /// Current settings
    pub fn snapshot(&self) -> Arc<GroveConfig> {
        Arc::clone(&*self.current.read())
    }

    /// Apply a partial update, persist it, then publish it
    pub fn update(&self, update: &ConfigUpdate) -> Result<Arc<GroveConfig>> {
        let mut current = self.current.write();
        let next = Arc::new(current.with_update(update));

        if let Some(store) = &self.persist {
            store.save(GROVE_CONFIG_FILE, next.as_ref())?;
        }

        *current = Arc::clone(&next);
        drop(current);
        info!(
            "Settings updated (credentials: {})",
            if next.has_credentials() { "set" } else { "missing" }
        );
        Ok(next)
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::in_memory(GroveConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let json = JsonStore::new(dir.path());

        let store = ConfigStore::open(json.clone()).unwrap();
        assert!(json.file_path(GROVE_CONFIG_FILE).is_file());
        assert_eq!(*store.snapshot(), GroveConfig::default());
    }

    #[test]
    fn test_update_persists() {
        let dir = tempfile::tempdir().unwrap();
        let json = JsonStore::new(dir.path());
        let store = ConfigStore::open(json.clone()).unwrap();

        store
            .update(&ConfigUpdate {
                audio_format: Some("flac".to_string()),
                ..Default::default()
            })
            .unwrap();

        let reopened = ConfigStore::open(json).unwrap();
        assert_eq!(reopened.snapshot().audio_format, "flac");
    }

    #[test]
    fn test_snapshot_is_stable_across_update() {
        let store = ConfigStore::default();
        let before = store.snapshot();

        store
            .update(&ConfigUpdate {
                audio_quality: Some("128k".to_string()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(before.audio_quality, "320k");
        assert_eq!(store.snapshot().audio_quality, "128k");
    }
}
