//! # grove-foundation
//!
//! Foundation layer for GroveGrab:
//! - Error: the error taxonomy shared by every crate
//! - Config: persisted user settings (credentials, paths, audio format)
//! - Storage: JSON files under the platform config directory

pub mod config;
pub mod error;
pub mod storage;

pub use config::{ConfigStore, ConfigUpdate, GroveConfig, PublicConfig, GROVE_CONFIG_FILE};
pub use error::{Error, Result};
pub use storage::JsonStore;
