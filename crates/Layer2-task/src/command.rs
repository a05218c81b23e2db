//! Command builder for the download tool
//!
//! Argument order is fixed:
//!
//! ```text
//! <program> <url> [--client-id ID --client-secret SECRET]
//!           [--preload | --output PATH --format FMT [--bitrate RATE] --overwrite skip]
//! ```

use grove_foundation::GroveConfig;
use std::path::Path;

/// Default program name
pub const DEFAULT_TOOL: &str = "spotdl";

/// A fully-built invocation of the download tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
}

impl ToolCommand {
    /// Metadata-only run
    pub fn preload(program: &str, url: &str, config: &GroveConfig) -> Self {
        let mut command = Self::base(program, url, config);
        command.push("--preload");
        command
    }

    /// Full download into `output`
    pub fn download(program: &str, url: &str, output: &Path, config: &GroveConfig) -> Self {
        let mut command = Self::base(program, url, config);
        command.push("--output");
        command.push(output.to_string_lossy());
        command.push("--format");
        command.push(&config.audio_format);
        if config.audio_format == "mp3" {
            command.push("--bitrate");
            command.push(&config.audio_quality);
        }
        command.push("--overwrite");
        command.push("skip");
        command
    }

    fn base(program: &str, url: &str, config: &GroveConfig) -> Self {
        let mut command = Self {
            program: program.to_string(),
            args: Vec::with_capacity(12),
        };
        command.push(url);
        if let Some((client_id, client_secret)) = config.credentials() {
            command.push("--client-id");
            command.push(client_id);
            command.push("--client-secret");
            command.push(client_secret);
        }
        command
    }

    fn push(&mut self, arg: impl Into<String>) {
        self.args.push(arg.into());
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The first argument (the URL)
    pub fn url(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or_default()
    }

    /// Safe to log: program and URL only, never credentials
    pub fn display_safe(&self) -> String {
        format!("{} {}...", self.program, self.url())
    }
}

impl std::fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display_safe())
    }
}
