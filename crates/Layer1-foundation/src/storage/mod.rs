//! Storage module for GroveGrab
//!
//! - `json`: JSON - configuration files under the platform config directory

mod json;

pub use json::JsonStore;
