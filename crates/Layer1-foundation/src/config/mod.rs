//! Config - persisted settings
//!
//! - `grove.rs` - GroveConfig user settings
//! - `shared.rs` - ConfigStore snapshot/update handle

mod grove;
mod shared;

pub use grove::{ConfigUpdate, GroveConfig, PublicConfig, GROVE_CONFIG_FILE};
pub use shared::ConfigStore;
