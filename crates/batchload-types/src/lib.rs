//! Shared types for batchload
//!
//! This crate contains the data structures shared between the
//! download engine and the CLI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default number of simultaneously transferring downloads
pub const DEFAULT_NUMBER_OF_THREADS: usize = 2;

/// Default chunk size in bytes; every chunk is metered separately
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Default aggregate rate in bytes per second (50 000 chunks of 1 KiB)
pub const DEFAULT_RATE_LIMIT: u64 = 50_000 * DEFAULT_CHUNK_SIZE as u64;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for a single batch
///
/// Immutable for the lifetime of one `load` call. Field names follow the
/// option names used in config files (`saveDirectory`, `numberOfThreads`,
/// `rateLimit`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchConfig {
    /// URLs to download, in input order. Duplicates are allowed.
    pub urls: Vec<String>,
    /// Destination root for all files
    pub save_directory: PathBuf,
    /// Capacity of the concurrency gate
    pub number_of_threads: usize,
    /// Aggregate byte budget per second across all downloads
    pub rate_limit: u64,
    /// Size of each metered chunk
    pub chunk_size: usize,
    /// When a worker takes its concurrency slot
    pub admission: Admission,
}

impl BatchConfig {
    pub fn new(urls: Vec<String>, save_directory: impl Into<PathBuf>) -> Self {
        Self {
            urls,
            save_directory: save_directory.into(),
            ..Self::default()
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            save_directory: dirs::download_dir()
                .map(|p| p.join("batchload"))
                .unwrap_or_else(|| PathBuf::from("downloads")),
            number_of_threads: DEFAULT_NUMBER_OF_THREADS,
            rate_limit: DEFAULT_RATE_LIMIT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            admission: Admission::default(),
        }
    }
}

/// Point in a worker's lifecycle at which the concurrency slot is acquired
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Admission {
    /// Acquire the slot before opening the remote stream and the file, so the
    /// gate also bounds open connections and file handles
    #[default]
    BeforeOpen,
    /// Open both streams first and only gate the copy phase
    AfterOpen,
}

// ============================================================================
// Task Types
// ============================================================================

/// Final status of one task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Completed,
    Failed,
    Interrupted,
}

/// Outcome of one URL in a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    /// Position of the URL in the input list
    pub index: usize,
    pub url: String,
    /// Derived destination, if the URL yielded a usable file name
    pub destination: Option<PathBuf>,
    pub status: TaskStatus,
    pub bytes_written: u64,
    pub error: Option<String>,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

// ============================================================================
// Report Types
// ============================================================================

/// Result of one `load` call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    /// Wall-clock time from just before dispatch until every worker finished
    pub elapsed: Duration,
    /// Number of URLs in the batch; exceeds `outcomes.len()` after an interrupt
    pub url_count: usize,
    /// Per-URL outcomes, sorted by input position
    pub outcomes: Vec<TaskOutcome>,
    /// Highest number of workers that held a gate slot at the same time
    pub peak_concurrency: usize,
    /// False when the URL list was empty and nothing was launched
    pub dispatched: bool,
    /// True when the wait was cut short by a shutdown signal
    pub interrupted: bool,
}

impl BatchReport {
    /// Report for a batch that had nothing to do
    pub fn empty() -> Self {
        Self {
            started_at: Utc::now(),
            elapsed: Duration::ZERO,
            url_count: 0,
            outcomes: Vec::new(),
            peak_concurrency: 0,
            dispatched: false,
            interrupted: false,
        }
    }

    /// Elapsed time in whole seconds, as printed in the summary line
    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed.as_secs()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn total_bytes(&self) -> u64 {
        self.outcomes.iter().map(|o| o.bytes_written).sum()
    }

    /// URLs with no outcome, because the wait ended before they reported
    pub fn unreported(&self) -> usize {
        self.url_count.saturating_sub(self.outcomes.len())
    }
}

// ============================================================================
// Event Types
// ============================================================================

/// Events emitted by the engine while a batch runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum BatchEvent {
    TaskStarted {
        index: usize,
        url: String,
        total: Option<u64>,
    },
    TaskProgress {
        index: usize,
        bytes_written: u64,
    },
    TaskFinished {
        outcome: TaskOutcome,
    },
    BatchFinished {
        elapsed: Duration,
        succeeded: usize,
        failed: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(index: usize, status: TaskStatus, bytes: u64) -> TaskOutcome {
        TaskOutcome {
            index,
            url: format!("http://example.com/{}.bin", index),
            destination: None,
            status,
            bytes_written: bytes,
            error: None,
        }
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: BatchConfig =
            serde_json::from_str(r#"{"saveDirectory": "/tmp/out", "numberOfThreads": 5}"#)
                .unwrap();
        assert_eq!(config.save_directory, PathBuf::from("/tmp/out"));
        assert_eq!(config.number_of_threads, 5);
        assert_eq!(config.rate_limit, DEFAULT_RATE_LIMIT);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.admission, Admission::BeforeOpen);
    }

    #[test]
    fn test_admission_serde_names() {
        let json = serde_json::to_string(&Admission::AfterOpen).unwrap();
        assert_eq!(json, "\"after-open\"");
    }

    #[test]
    fn test_report_counts() {
        let mut report = BatchReport::empty();
        report.url_count = 5;
        report.outcomes = vec![
            outcome(0, TaskStatus::Completed, 100),
            outcome(1, TaskStatus::Failed, 20),
            outcome(2, TaskStatus::Interrupted, 0),
        ];
        report.elapsed = Duration::from_millis(2500);

        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 2);
        assert_eq!(report.total_bytes(), 120);
        assert_eq!(report.elapsed_seconds(), 2);
        assert_eq!(report.unreported(), 2);
    }
}
