//! Foreground task runner
//!
//! Polls the engine once per second, prints new log lines and a progress
//! summary, and turns Ctrl-C into a cancel request.

use grove_task::{TaskEngine, TaskId, TaskRecord, TaskStatus};
use std::time::Duration;
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Follow a task until its worker has finished
pub async fn follow(engine: &TaskEngine, id: TaskId) -> anyhow::Result<TaskRecord> {
    let mut printed = 0usize;
    let mut last_summary = String::new();
    let mut interval = tokio::time::interval(POLL_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancel_sent = false;

    println!("Task {}", id);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            result = &mut ctrl_c, if !cancel_sent => {
                result?;
                cancel_sent = true;
                println!("\nStopping...");
                if let Err(e) = engine.cancel(id) {
                    debug!("Cancel ignored: {}", e);
                }
            }
        }

        let record = engine.get(id)?;
        for entry in record.logs.iter().skip(printed) {
            println!("{}", entry);
        }
        printed = record.logs.len();

        let summary = summary_line(&record);
        if summary != last_summary {
            println!("{}", summary);
            last_summary = summary;
        }

        if record.status.is_terminal() && !engine.is_active(id) {
            return Ok(record);
        }
    }
}

/// One-line progress summary
pub fn summary_line(record: &TaskRecord) -> String {
    let mut line = format!(
        "{} {:>3}% [{}]",
        record.status.symbol(),
        record.progress,
        progress_bar(record.progress, 20)
    );

    if record.total_tracks > 0 {
        line.push_str(&format!(
            " {}/{} tracks",
            record.completed_tracks, record.total_tracks
        ));
    }
    if record.failed_tracks > 0 {
        line.push_str(&format!(", {} failed", record.failed_tracks));
    }
    if record.status == TaskStatus::Running && !record.current_track.is_empty() {
        line.push_str(&format!(" - {}", truncate(&record.current_track, 48)));
    }
    line
}

fn progress_bar(percent: u8, width: usize) -> String {
    let filled = (usize::from(percent.min(100)) * width) / 100;
    format!("{}{}", "#".repeat(filled), "-".repeat(width - filled))
}

/// Truncate a string for display
fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0, 10), "----------");
        assert_eq!(progress_bar(50, 10), "#####-----");
        assert_eq!(progress_bar(100, 10), "##########");
    }

    #[test]
    fn test_summary_line() {
        let mut record = TaskRecord::download("https://open.spotify.com/album/x", None);
        record.total_tracks = 3;
        record.completed_tracks = 1;
        record.progress = 33;
        record.current_track = "Song B".to_string();

        let line = summary_line(&record);
        assert!(line.contains(" 33%"));
        assert!(line.contains("1/3 tracks"));
        assert!(line.ends_with("- Song B"));

        record.status = TaskStatus::Completed;
        assert!(!summary_line(&record).contains("Song B"));
    }

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("héllo", 10), "héllo");
        assert_eq!(truncate("héllo wörld", 5), "héllo...");
    }
}
