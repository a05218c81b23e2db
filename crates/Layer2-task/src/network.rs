//! Network checks
//!
//! - A reachability probe run before a download spawns the tool
//! - Classification of transient DNS/connection lines in tool output
//! - A per-run monitor that rate-limits warnings and decides when to abort

use grove_foundation::{Error, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// Message logged when the probe fails
pub const OFFLINE_MESSAGE: &str =
    "No internet connection detected. Please check your network and try again.";

/// Every Nth repeat of one issue kind is logged again
const REPEAT_LOG_INTERVAL: u32 = 10;

/// Open a TCP connection to `addr` within `timeout`
pub async fn probe_connectivity(addr: SocketAddr, timeout: Duration) -> Result<()> {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_)) => {
            debug!("Connectivity probe to {} succeeded", addr);
            Ok(())
        }
        Ok(Err(e)) => {
            debug!("Connectivity probe to {} failed: {}", addr, e);
            Err(Error::Connectivity(OFFLINE_MESSAGE.to_string()))
        }
        Err(_) => {
            debug!("Connectivity probe to {} timed out", addr);
            Err(Error::Connectivity(OFFLINE_MESSAGE.to_string()))
        }
    }
}

/// Transient network failure reported by the tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkIssue {
    /// Name resolution failed
    Dns,
    /// An established connection dropped
    Connection,
}

impl NetworkIssue {
    /// Case-sensitive match on the markers the tool prints
    pub fn classify(line: &str) -> Option<Self> {
        if line.contains("getaddrinfo failed") || line.contains("Failed to resolve") {
            Some(NetworkIssue::Dns)
        } else if line.contains("ConnectionResetError") || line.contains("Connection broken") {
            Some(NetworkIssue::Connection)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkIssue::Dns => "dns",
            NetworkIssue::Connection => "connection",
        }
    }

    fn warning(&self) -> &'static str {
        match self {
            NetworkIssue::Dns => "Network/DNS error detected. Retrying...",
            NetworkIssue::Connection => {
                "Connection issue detected. The download tool will retry automatically..."
            }
        }
    }
}

impl std::fmt::Display for NetworkIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the worker should do after a network line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkVerdict {
    /// Log this warning into the task
    Warn(String),
    /// Counted, nothing to log
    Quiet,
    /// Threshold exceeded; stop the run
    Abort,
}

/// Counts network issues within one run
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    threshold: u32,
    dns: u32,
    connection: u32,
}

impl NetworkMonitor {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            dns: 0,
            connection: 0,
        }
    }

    /// Record one issue
    pub fn record(&mut self, issue: NetworkIssue) -> NetworkVerdict {
        let seen = match issue {
            NetworkIssue::Dns => {
                self.dns += 1;
                self.dns
            }
            NetworkIssue::Connection => {
                self.connection += 1;
                self.connection
            }
        };

        if self.total() > self.threshold {
            return NetworkVerdict::Abort;
        }

        if seen == 1 {
            NetworkVerdict::Warn(issue.warning().to_string())
        } else if seen % REPEAT_LOG_INTERVAL == 0 {
            NetworkVerdict::Warn(format!("{} ({} occurrences)", issue.warning(), seen))
        } else {
            NetworkVerdict::Quiet
        }
    }

    /// DNS and connection issues seen so far
    pub fn total(&self) -> u32 {
        self.dns + self.connection
    }

    /// Cause recorded when the run is aborted
    pub fn abort_error(&self) -> Error {
        Error::Connectivity(format!(
            "Network connectivity issues - {} DNS/connection failures (limit {})",
            self.total(),
            self.threshold
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(
            NetworkIssue::classify("socket.gaierror: [Errno 11001] getaddrinfo failed"),
            Some(NetworkIssue::Dns)
        );
        assert_eq!(
            NetworkIssue::classify("Failed to resolve 'api.spotify.com'"),
            Some(NetworkIssue::Dns)
        );
        assert_eq!(
            NetworkIssue::classify("ConnectionResetError(104, 'Connection reset by peer')"),
            Some(NetworkIssue::Connection)
        );
        assert_eq!(
            NetworkIssue::classify("urllib3: Connection broken: IncompleteRead"),
            Some(NetworkIssue::Connection)
        );
        assert_eq!(NetworkIssue::classify("Downloaded \"Song A\""), None);
    }

    #[test]
    fn test_first_occurrence_warns_then_quiet() {
        let mut monitor = NetworkMonitor::new(100);

        assert!(matches!(
            monitor.record(NetworkIssue::Dns),
            NetworkVerdict::Warn(_)
        ));
        assert_eq!(monitor.record(NetworkIssue::Dns), NetworkVerdict::Quiet);
        // a different kind warns on its own first occurrence
        assert!(matches!(
            monitor.record(NetworkIssue::Connection),
            NetworkVerdict::Warn(_)
        ));
    }

    #[test]
    fn test_every_tenth_repeat_warns() {
        let mut monitor = NetworkMonitor::new(100);
        let verdicts: Vec<_> = (0..20).map(|_| monitor.record(NetworkIssue::Dns)).collect();

        let warned: Vec<usize> = verdicts
            .iter()
            .enumerate()
            .filter(|(_, v)| matches!(v, NetworkVerdict::Warn(_)))
            .map(|(i, _)| i + 1)
            .collect();
        assert_eq!(warned, vec![1, 10, 20]);
    }

    #[test]
    fn test_abort_after_threshold() {
        let mut monitor = NetworkMonitor::new(10);
        for _ in 0..6 {
            assert_ne!(monitor.record(NetworkIssue::Dns), NetworkVerdict::Abort);
        }
        for _ in 0..4 {
            assert_ne!(monitor.record(NetworkIssue::Connection), NetworkVerdict::Abort);
        }
        assert_eq!(monitor.total(), 10);
        assert_eq!(monitor.record(NetworkIssue::Dns), NetworkVerdict::Abort);
        assert!(matches!(monitor.abort_error(), Error::Connectivity(_)));
    }

    #[tokio::test]
    async fn test_probe_unreachable() {
        // bind then drop to find a closed local port
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = probe_connectivity(addr, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(Error::Connectivity(_))));
    }

    #[tokio::test]
    async fn test_probe_reachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        assert!(probe_connectivity(addr, Duration::from_secs(1)).await.is_ok());
    }
}
