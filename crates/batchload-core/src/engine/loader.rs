//! Batch loader - the entry point of the engine
//!
//! Launches one worker per URL, waits on the completion counter, and
//! reports elapsed time plus per-URL outcomes:
//!
//! `Idle -> Dispatching -> Awaiting -> Done`
//!
//! An empty URL list goes straight to `Done` without building a gate, a
//! limiter, or any worker.

use crate::engine::{
    CompletionCounter, ConcurrencyGate, DownloadTask, DownloadWorker, RateLimiter, WorkerContext,
};
use crate::error::LoaderError;
use crate::storage::prepare_directory;
use batchload_types::{BatchConfig, BatchEvent, BatchReport};
use chrono::Utc;
use reqwest::Client;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{info, warn};

/// Runs batches for one validated configuration
pub struct BatchLoader {
    config: BatchConfig,
    client: Client,
    event_tx: broadcast::Sender<BatchEvent>,
}

impl BatchLoader {
    /// Validate the configuration and prepare the save directory
    pub async fn new(config: BatchConfig) -> Result<Self, LoaderError> {
        // No request timeout: a stalled server holds its slot until it
        // closes the connection
        let client = Client::builder()
            .user_agent(concat!("batchload/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Self::with_client(config, client).await
    }

    /// Same as [`BatchLoader::new`] with a caller-supplied HTTP client
    pub async fn with_client(config: BatchConfig, client: Client) -> Result<Self, LoaderError> {
        validate(&config)?;
        prepare_directory(&config.save_directory).await?;

        let (event_tx, _) = broadcast::channel(1024);

        Ok(Self {
            config,
            client,
            event_tx,
        })
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Subscribe to events of subsequent `load` calls
    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.event_tx.subscribe()
    }

    /// Download every URL and wait for all of them
    pub async fn load(&self) -> BatchReport {
        self.load_until(std::future::pending()).await
    }

    /// Like [`BatchLoader::load`], but stop waiting once `shutdown` resolves
    ///
    /// On shutdown the gate is closed, so workers still waiting for a slot
    /// finish as interrupted. Workers already transferring are left running.
    /// The report then holds the outcomes gathered up to that point.
    pub async fn load_until<F>(&self, shutdown: F) -> BatchReport
    where
        F: Future<Output = ()>,
    {
        let urls = &self.config.urls;
        if urls.is_empty() {
            info!("URL list is empty, nothing to download");
            return BatchReport::empty();
        }

        let started_at = Utc::now();
        let start = Instant::now();

        let gate = ConcurrencyGate::new(self.config.number_of_threads);
        let rate_limiter =
            RateLimiter::new(self.config.rate_limit, self.config.chunk_size as u64);
        let completion = CompletionCounter::new(urls.len());
        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();

        let ctx = WorkerContext {
            client: self.client.clone(),
            gate: gate.clone(),
            rate_limiter,
            chunk_size: self.config.chunk_size,
            admission: self.config.admission,
            event_tx: self.event_tx.clone(),
            outcome_tx,
        };

        info!(
            "Starting batch of {} downloads (threads: {}, rate limit: {} B/s, admission: {:?})",
            urls.len(),
            self.config.number_of_threads,
            self.config.rate_limit,
            self.config.admission
        );

        let mut destination_locks: HashMap<PathBuf, Arc<Mutex<()>>> = HashMap::new();
        for (index, url) in urls.iter().enumerate() {
            let task = DownloadTask::new(index, url.clone(), &self.config.save_directory);
            let task = match task.destination.clone() {
                Some(destination) => {
                    let lock = destination_locks
                        .entry(destination)
                        .or_insert_with(|| task.destination_lock.clone())
                        .clone();
                    task.with_destination_lock(lock)
                }
                None => task,
            };

            let worker = DownloadWorker::new(task, ctx.clone(), completion.handle());
            tokio::spawn(worker.run());
        }
        // Workers hold the only remaining senders
        drop(ctx);

        let interrupted = tokio::select! {
            biased;
            _ = completion.wait() => false,
            _ = shutdown => {
                warn!(
                    "Batch interrupted with {} downloads unfinished",
                    completion.remaining()
                );
                gate.close();
                true
            }
        };
        let elapsed = start.elapsed();

        let mut outcomes = Vec::with_capacity(urls.len());
        while let Ok(outcome) = outcome_rx.try_recv() {
            outcomes.push(outcome);
        }
        outcomes.sort_by_key(|o| o.index);

        let report = BatchReport {
            started_at,
            elapsed,
            url_count: urls.len(),
            outcomes,
            peak_concurrency: gate.peak(),
            dispatched: true,
            interrupted,
        };

        info!(
            "Batch finished in {} s: {} succeeded, {} failed",
            report.elapsed_seconds(),
            report.succeeded(),
            report.failed()
        );
        let _ = self.event_tx.send(BatchEvent::BatchFinished {
            elapsed,
            succeeded: report.succeeded(),
            failed: report.failed(),
        });

        report
    }
}

/// Check the configuration invariants before anything is launched
pub fn validate(config: &BatchConfig) -> Result<(), LoaderError> {
    if config
        .save_directory
        .as_os_str()
        .to_string_lossy()
        .trim()
        .is_empty()
    {
        return Err(LoaderError::InvalidConfig(
            "save directory must not be blank".to_string(),
        ));
    }
    if config.number_of_threads == 0 {
        return Err(LoaderError::InvalidConfig(
            "number of threads must be greater than 0".to_string(),
        ));
    }
    if config.rate_limit == 0 {
        return Err(LoaderError::InvalidConfig(
            "rate limit must be greater than 0".to_string(),
        ));
    }
    if config.chunk_size == 0 {
        return Err(LoaderError::InvalidConfig(
            "chunk size must be greater than 0".to_string(),
        ));
    }
    if let Some(position) = config.urls.iter().position(|u| u.trim().is_empty()) {
        return Err(LoaderError::InvalidConfig(format!(
            "URL at position {} is blank",
            position
        )));
    }

    Ok(())
}

/// Validate `config`, run the batch, and return its report
pub async fn load(config: BatchConfig) -> Result<BatchReport, LoaderError> {
    let loader = BatchLoader::new(config).await?;
    Ok(loader.load().await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BatchConfig {
        BatchConfig::new(vec!["http://x/a.bin".to_string()], "/tmp/batchload-test")
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(validate(&config()).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut c = config();
        c.number_of_threads = 0;
        assert!(matches!(validate(&c), Err(LoaderError::InvalidConfig(_))));

        let mut c = config();
        c.rate_limit = 0;
        assert!(matches!(validate(&c), Err(LoaderError::InvalidConfig(_))));

        let mut c = config();
        c.chunk_size = 0;
        assert!(matches!(validate(&c), Err(LoaderError::InvalidConfig(_))));

        let mut c = config();
        c.save_directory = PathBuf::from(" ");
        assert!(matches!(validate(&c), Err(LoaderError::InvalidConfig(_))));

        let mut c = config();
        c.urls.push("   ".to_string());
        let err = validate(&c).unwrap_err();
        assert!(err.to_string().contains("position 1"));
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_no_op() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = BatchLoader::new(BatchConfig::new(Vec::new(), tmp.path()))
            .await
            .unwrap();
        let mut events = loader.subscribe();

        let report = loader.load().await;

        assert!(!report.dispatched);
        assert_eq!(report.url_count, 0);
        assert!(report.outcomes.is_empty());
        assert_eq!(report.peak_concurrency, 0);
        assert_eq!(report.elapsed_seconds(), 0);
        // Nothing was launched, so nothing was announced
        assert!(events.try_recv().is_err());
    }
}
