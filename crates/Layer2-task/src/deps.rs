//! External dependency detection
//!
//! The engine needs the download tool on `PATH`, and the tool itself needs
//! ffmpeg for conversion.

use serde::Serialize;
use std::path::PathBuf;

/// Resolution of one executable
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    pub name: String,
    pub path: Option<PathBuf>,
}

impl Dependency {
    /// Look `name` up on `PATH`
    pub fn locate(name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: which::which(name).ok(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.path.is_some()
    }
}

/// Availability of everything a download needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyReport {
    pub tool: Dependency,
    pub ffmpeg: Dependency,
}

impl DependencyReport {
    pub fn all_available(&self) -> bool {
        self.tool.is_available() && self.ffmpeg.is_available()
    }

    /// Names of the executables that were not found
    pub fn missing(&self) -> Vec<&str> {
        [&self.tool, &self.ffmpeg]
            .into_iter()
            .filter(|dep| !dep.is_available())
            .map(|dep| dep.name.as_str())
            .collect()
    }
}

/// Check for `tool` and ffmpeg
pub fn check_dependencies(tool: &str) -> DependencyReport {
    DependencyReport {
        tool: Dependency::locate(tool),
        ffmpeg: Dependency::locate("ffmpeg"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tool_reported() {
        let report = check_dependencies("grovegrab-definitely-missing-tool");
        assert!(!report.tool.is_available());
        assert!(!report.all_available());
        assert!(report.missing().contains(&"grovegrab-definitely-missing-tool"));
    }

    #[cfg(unix)]
    #[test]
    fn test_present_executable_found() {
        let dep = Dependency::locate("sh");
        assert!(dep.is_available());
    }
}
