//! Progress Interpreter - turns one line of tool output into record updates
//!
//! The tool speaks free text, so every rule here is a heuristic. Lines that
//! match nothing are logged and otherwise ignored.

use crate::log::LogEntry;
use crate::network::NetworkIssue;
use crate::state::TrackStatus;
use crate::task::TaskRecord;
use regex::Regex;
use std::sync::OnceLock;

/// Result of interpreting one line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    /// The line was logged and classified
    Recorded,
    /// A transient network failure; the record was not touched
    Network(NetworkIssue),
}

fn total_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)Found\s+(\d+)\s+(?:songs?|tracks?)").expect("static regex")
    })
}

fn quoted_title_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""([^"\n]+)""#).expect("static regex"))
}

fn prefixed_title_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:Downloading|Processing)[:\s]+(.+)$").expect("static regex")
    })
}

/// 1-3 digits before `%`, optional fraction, not glued to a preceding digit or dot
fn percent_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:^|[^\d.])(\d{1,3})(?:\.\d+)?%").expect("static regex"))
}

/// `Found N songs` / `Found N tracks`
pub fn extract_total(line: &str) -> Option<u32> {
    total_regex()
        .captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// First quoted substring, else the rest of a `Downloading:`/`Processing:` line
pub fn extract_title(line: &str) -> Option<String> {
    if let Some(caps) = quoted_title_regex().captures(line) {
        return caps.get(1).map(|m| m.as_str().to_string());
    }

    prefixed_title_regex()
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|title| !title.is_empty())
}

/// First percentage on the line, clamped to 0-100
pub fn extract_percent(line: &str) -> Option<u8> {
    percent_regex()
        .captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u16>().ok())
        .map(|value| value.min(100) as u8)
}

/// Apply one output line to `record`
///
/// Network lines return early and leave the record (and its log) alone;
/// the caller decides how to report them. Everything else is classified
/// and then appended to the log verbatim.
pub fn interpret(record: &mut TaskRecord, line: &str) -> LineOutcome {
    if let Some(issue) = NetworkIssue::classify(line) {
        return LineOutcome::Network(issue);
    }

    if let Some(total) = extract_total(line) {
        record.total_tracks = total;
    }

    let title = extract_title(line);
    let percent = extract_percent(line);
    let lowered = line.to_lowercase();

    if lowered.contains("downloading") || lowered.contains("processing") {
        if let Some(title) = &title {
            record.current_track = title.clone();
            let track = record.upsert_track(title);
            if !track.status.is_settled() {
                track.status = TrackStatus::Downloading;
                if let Some(percent) = percent {
                    track.progress = percent;
                }
            }
        }
    }

    if lowered.contains("downloaded") || lowered.contains("completed") {
        if let Some(target) = referenced_title(record, title.as_deref()) {
            let track = record.upsert_track(&target);
            if !track.status.is_settled() {
                track.status = TrackStatus::Completed;
                track.progress = 100;
                record.completed_tracks += 1;
            }
        }
    }

    if lowered.contains("failed") || lowered.contains("error") {
        if let Some(target) = referenced_title(record, title.as_deref()) {
            let track = record.upsert_track(&target);
            if !track.status.is_settled() {
                track.status = TrackStatus::Failed;
                if percent.is_none() {
                    track.progress = 0;
                }
                record.failed_tracks += 1;
                record.failed_track_list.push(line.to_string());
            }
        }
    }

    record.recompute_progress();
    record.push_log(LogEntry::output(line));
    LineOutcome::Recorded
}

/// The extracted title, else the track currently in progress
fn referenced_title(record: &TaskRecord, title: Option<&str>) -> Option<String> {
    match title {
        Some(title) => Some(title.to_string()),
        None if !record.current_track.is_empty() => Some(record.current_track.clone()),
        None => None,
    }
}
