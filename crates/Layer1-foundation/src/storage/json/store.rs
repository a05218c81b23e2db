//! JSON documents on disk, one file per document

use crate::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::io::ErrorKind;
use std::path::PathBuf;

const APP_DIR: &str = "grovegrab";

/// A directory holding pretty-printed JSON files
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<platform config dir>/grovegrab`
    pub fn global() -> Result<Self> {
        dirs::config_dir()
            .map(|dir| Self::new(dir.join(APP_DIR)))
            .ok_or_else(|| Error::Config("no platform config directory".to_string()))
    }

    pub fn file_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Parse `name`; a missing file is `Ok(None)`, a malformed one an error
    pub fn load_optional<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.file_path(name);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::Config(format!("cannot read {}: {}", path.display(), e)))
            }
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| Error::Config(format!("{} is not valid: {}", path.display(), e)))
    }

    /// Write `value` to `name`, creating the directory on first use
    pub fn save<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| Error::Config(format!("cannot create {}: {}", self.dir.display(), e)))?;

        let path = self.file_path(name);
        let text = serde_json::to_string_pretty(value)?;
        std::fs::write(&path, text)
            .map_err(|e| Error::Config(format!("cannot write {}: {}", path.display(), e)))
    }
}
