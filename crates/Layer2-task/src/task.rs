//! Task definition and types

use crate::log::LogEntry;
use crate::state::{TaskStatus, TrackStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Generate a new random TaskId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First 8 characters, for log lines
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// What a task does with its URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Metadata only, no files written
    Preload,
    /// Fetch audio files into a directory
    Download,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Preload => "preload",
            TaskKind::Download => "download",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One media item seen in the tool output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub title: String,
    pub status: TrackStatus,
    pub progress: u8,
}

impl Track {
    pub fn queued(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            status: TrackStatus::Queued,
            progress: 0,
        }
    }
}

/// Observable state of one task
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: TaskId,
    pub url: String,
    pub kind: TaskKind,
    pub status: TaskStatus,

    /// Overall percent, 0-100
    pub progress: u8,

    pub total_tracks: u32,
    pub completed_tracks: u32,
    pub failed_tracks: u32,

    /// Title of the track being processed, empty when idle
    pub current_track: String,

    /// Tracks in first-seen order
    pub tracks: Vec<Track>,

    /// Target directory (download tasks only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_path: Option<PathBuf>,

    pub logs: Vec<LogEntry>,

    /// Raw tool lines that reported a failure
    pub failed_track_list: Vec<String>,

    pub cancelled: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Create a running record
    pub fn new(id: TaskId, kind: TaskKind, url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            url: url.into(),
            kind,
            status: TaskStatus::Running,
            progress: 0,
            total_tracks: 0,
            completed_tracks: 0,
            failed_tracks: 0,
            current_track: String::new(),
            tracks: Vec::new(),
            download_path: None,
            logs: Vec::new(),
            failed_track_list: Vec::new(),
            cancelled: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn preload(url: impl Into<String>) -> Self {
        Self::new(TaskId::new(), TaskKind::Preload, url)
    }

    pub fn download(url: impl Into<String>, download_path: Option<PathBuf>) -> Self {
        let mut record = Self::new(TaskId::new(), TaskKind::Download, url);
        record.download_path = download_path;
        record
    }

    /// Refresh `updated_at`
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn push_log(&mut self, entry: LogEntry) {
        self.logs.push(entry);
    }

    pub fn track(&self, title: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.title == title)
    }

    /// Find a track by exact title, appending a queued one when absent
    pub fn upsert_track(&mut self, title: &str) -> &mut Track {
        let index = match self.tracks.iter().position(|t| t.title == title) {
            Some(index) => index,
            None => {
                self.tracks.push(Track::queued(title));
                self.tracks.len() - 1
            }
        };
        &mut self.tracks[index]
    }

    /// `floor(100 * completed / total)` when the total is known
    pub fn recompute_progress(&mut self) {
        if self.total_tracks > 0 {
            let percent = u64::from(self.completed_tracks) * 100 / u64::from(self.total_tracks);
            self.progress = percent.min(100) as u8;
        }
    }

    /// Cancel transition: flag, status, in-flight tracks, current track
    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
        self.status = TaskStatus::Cancelled;
        for track in self.tracks.iter_mut().filter(|t| t.status.is_in_flight()) {
            track.status = TrackStatus::Cancelled;
        }
        self.current_track.clear();
        self.touch();
    }

    /// Start a new run after a failure
    ///
    /// Completed tracks and the log survive; failed tracks are queued again.
    pub fn reset_for_retry(&mut self) {
        self.failed_tracks = 0;
        self.failed_track_list.clear();
        self.cancelled = false;
        self.current_track.clear();
        for track in self
            .tracks
            .iter_mut()
            .filter(|t| t.status == TrackStatus::Failed)
        {
            track.status = TrackStatus::Queued;
            track.progress = 0;
        }
        self.status = TaskStatus::Running;
        self.touch();
    }
}
