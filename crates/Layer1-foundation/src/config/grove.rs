//! Grove Config - persisted user settings
//!
//! Spotify API credentials, the default download directory and the audio
//! output settings handed to the download tool.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Settings file name
pub const GROVE_CONFIG_FILE: &str = "config.json";

const DEFAULT_REDIRECT_URI: &str = "http://localhost:8888/callback";
const DEFAULT_AUDIO_FORMAT: &str = "mp3";
const DEFAULT_AUDIO_QUALITY: &str = "320k";

// ============================================================================
// Grove Config
// ============================================================================

/// User settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroveConfig {
    /// Spotify API client id
    #[serde(default)]
    pub client_id: String,

    /// Spotify API client secret
    #[serde(default)]
    pub client_secret: String,

    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,

    /// Directory used when a download request names no path
    #[serde(default = "default_download_path")]
    pub default_download_path: PathBuf,

    /// Output audio format (mp3, flac, ogg, opus, m4a, wav)
    #[serde(default = "default_audio_format")]
    pub audio_format: String,

    /// Bitrate, only passed to the tool for mp3
    #[serde(default = "default_audio_quality")]
    pub audio_quality: String,
}

impl Default for GroveConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: default_redirect_uri(),
            default_download_path: default_download_path(),
            audio_format: default_audio_format(),
            audio_quality: default_audio_quality(),
        }
    }
}

impl GroveConfig {
    /// Both client id and secret are set
    pub fn has_credentials(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    /// Credentials as a pair, if complete
    pub fn credentials(&self) -> Option<(&str, &str)> {
        if self.has_credentials() {
            Some((&self.client_id, &self.client_secret))
        } else {
            None
        }
    }

    /// Return a copy with `update` applied
    pub fn with_update(&self, update: &ConfigUpdate) -> Self {
        let mut next = self.clone();
        next.apply(update);
        next
    }

    /// Overwrite the fields present in `update`
    pub fn apply(&mut self, update: &ConfigUpdate) {
        if let Some(client_id) = &update.client_id {
            self.client_id = client_id.clone();
        }
        if let Some(client_secret) = &update.client_secret {
            self.client_secret = client_secret.clone();
        }
        if let Some(redirect_uri) = &update.redirect_uri {
            self.redirect_uri = redirect_uri.clone();
        }
        if let Some(path) = &update.download_path {
            self.default_download_path = path.clone();
        }
        if let Some(format) = &update.audio_format {
            self.audio_format = format.clone();
        }
        if let Some(quality) = &update.audio_quality {
            self.audio_quality = quality.clone();
        }
    }

    /// View safe to show to users (no secrets)
    pub fn public_view(&self) -> PublicConfig {
        PublicConfig {
            has_credentials: self.has_credentials(),
            default_download_path: self.default_download_path.clone(),
            audio_format: self.audio_format.clone(),
            audio_quality: self.audio_quality.clone(),
        }
    }

    // ========================================================================
    // Builder
    // ========================================================================

    pub fn credentials_pair(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.client_id = client_id.into();
        self.client_secret = client_secret.into();
        self
    }

    pub fn download_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.default_download_path = path.into();
        self
    }

    pub fn audio_format(mut self, format: impl Into<String>) -> Self {
        self.audio_format = format.into();
        self
    }

    pub fn audio_quality(mut self, quality: impl Into<String>) -> Self {
        self.audio_quality = quality.into();
        self
    }
}

// ============================================================================
// Update / Public view
// ============================================================================

/// Partial settings update; `None` leaves a field untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdate {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub download_path: Option<PathBuf>,
    pub audio_format: Option<String>,
    pub audio_quality: Option<String>,
}

impl ConfigUpdate {
    pub fn is_empty(&self) -> bool {
        self.client_id.is_none()
            && self.client_secret.is_none()
            && self.redirect_uri.is_none()
            && self.download_path.is_none()
            && self.audio_format.is_none()
            && self.audio_quality.is_none()
    }
}

/// Settings without credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicConfig {
    pub has_credentials: bool,
    pub default_download_path: PathBuf,
    pub audio_format: String,
    pub audio_quality: String,
}

// ============================================================================
// Defaults
// ============================================================================

fn default_redirect_uri() -> String {
    DEFAULT_REDIRECT_URI.to_string()
}

fn default_download_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join("Downloads"))
        .or_else(dirs::download_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("GroveGrab")
}

fn default_audio_format() -> String {
    DEFAULT_AUDIO_FORMAT.to_string()
}

fn default_audio_quality() -> String {
    DEFAULT_AUDIO_QUALITY.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GroveConfig::default();
        assert_eq!(config.audio_format, "mp3");
        assert_eq!(config.audio_quality, "320k");
        assert!(config.default_download_path.ends_with("GroveGrab"));
        assert!(!config.has_credentials());
        assert!(config.credentials().is_none());
    }

    #[test]
    fn test_partial_update() {
        let config = GroveConfig::default();
        let update = ConfigUpdate {
            client_id: Some("id".to_string()),
            audio_format: Some("flac".to_string()),
            ..Default::default()
        };

        let next = config.with_update(&update);
        assert_eq!(next.client_id, "id");
        assert_eq!(next.audio_format, "flac");
        assert_eq!(next.audio_quality, "320k");
        // secret still missing
        assert!(!next.has_credentials());

        let next = next.with_update(&ConfigUpdate {
            client_secret: Some("secret".to_string()),
            ..Default::default()
        });
        assert_eq!(next.credentials(), Some(("id", "secret")));
    }

    #[test]
    fn test_public_view_hides_secrets() {
        let config = GroveConfig::default().credentials_pair("id", "secret");
        let json = serde_json::to_string(&config.public_view()).unwrap();
        assert!(json.contains("\"hasCredentials\":true"));
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: GroveConfig = serde_json::from_str(r#"{"audioFormat":"opus"}"#).unwrap();
        assert_eq!(config.audio_format, "opus");
        assert_eq!(config.redirect_uri, "http://localhost:8888/callback");
        assert_eq!(config.audio_quality, "320k");
    }

    #[test]
    fn test_empty_update() {
        assert!(ConfigUpdate::default().is_empty());
        let update = ConfigUpdate {
            audio_quality: Some("128k".to_string()),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }
}
