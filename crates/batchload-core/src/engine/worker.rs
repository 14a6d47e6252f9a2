//! Download worker - transfers one URL to one file
//!
//! Each worker owns its HTTP response and file handle. The concurrency slot
//! and the rate limiter are the only things it shares with other workers.
//! Every failure stays inside the worker: it is logged, turned into a
//! [`TaskOutcome`], and the completion handle is dropped either way.

use crate::engine::completion::CompletionHandle;
use crate::engine::gate::{ConcurrencyGate, GatePermit};
use crate::engine::rate_limiter::RateLimiter;
use crate::error::LoaderError;
use crate::storage::destination_for;
use batchload_types::{Admission, BatchEvent, TaskOutcome, TaskStatus};
use futures::StreamExt;
use reqwest::{Client, Response};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, info, warn};

const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// One URL of the batch
pub struct DownloadTask {
    pub index: usize,
    pub url: String,
    /// `None` when the URL has no usable final path segment
    pub destination: Option<PathBuf>,
    /// Shared by every task of the batch writing to the same path
    pub destination_lock: Arc<Mutex<()>>,
}

impl DownloadTask {
    pub fn new(index: usize, url: String, save_directory: &Path) -> Self {
        let destination = destination_for(save_directory, &url);
        Self {
            index,
            url,
            destination,
            destination_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Serialize this task's file access with other tasks holding `lock`
    pub fn with_destination_lock(mut self, lock: Arc<Mutex<()>>) -> Self {
        self.destination_lock = lock;
        self
    }
}

/// Batch-wide resources every worker gets a handle to
#[derive(Clone)]
pub struct WorkerContext {
    pub client: Client,
    pub gate: ConcurrencyGate,
    pub rate_limiter: RateLimiter,
    pub chunk_size: usize,
    pub admission: Admission,
    pub event_tx: broadcast::Sender<BatchEvent>,
    pub outcome_tx: mpsc::UnboundedSender<TaskOutcome>,
}

pub struct DownloadWorker {
    task: DownloadTask,
    ctx: WorkerContext,
    bytes_written: u64,
    /// Dropped with the worker, after the outcome has been sent
    _completion: CompletionHandle,
}

impl DownloadWorker {
    pub fn new(task: DownloadTask, ctx: WorkerContext, completion: CompletionHandle) -> Self {
        Self {
            task,
            ctx,
            bytes_written: 0,
            _completion: completion,
        }
    }

    /// Run the transfer to completion and report the outcome
    pub async fn run(mut self) {
        let result = self.execute().await;

        let (status, error) = match result {
            Ok(()) => {
                info!(
                    "Downloaded {} ({} bytes)",
                    self.task.url, self.bytes_written
                );
                (TaskStatus::Completed, None)
            }
            Err(e) if e.is_interruption() => {
                warn!("Download interrupted: {}: {}", self.task.url, e);
                (TaskStatus::Interrupted, Some(e.to_string()))
            }
            Err(e) => {
                warn!("Download failed: {}: {}", self.task.url, e);
                (TaskStatus::Failed, Some(e.to_string()))
            }
        };

        let outcome = TaskOutcome {
            index: self.task.index,
            url: self.task.url.clone(),
            destination: self.task.destination.clone(),
            status,
            bytes_written: self.bytes_written,
            error,
        };

        let _ = self.ctx.event_tx.send(BatchEvent::TaskFinished {
            outcome: outcome.clone(),
        });
        let _ = self.ctx.outcome_tx.send(outcome);
    }

    async fn execute(&mut self) -> Result<(), LoaderError> {
        let destination = self
            .task
            .destination
            .clone()
            .ok_or_else(|| LoaderError::InvalidFileName(self.task.url.clone()))?;

        // Tasks sharing a destination write one after another; last one wins.
        // Closing the gate also ends this wait.
        let destination_lock = self.task.destination_lock.clone();
        let _file_guard = tokio::select! {
            biased;
            _ = self.ctx.gate.closed() => {
                return Err(LoaderError::Interrupted("the destination file"));
            }
            guard = destination_lock.lock() => guard,
        };

        let (permit, response, mut file) = match self.ctx.admission {
            Admission::BeforeOpen => {
                let permit = self.ctx.gate.acquire().await?;
                let (response, file) = self.open(&destination).await?;
                (permit, response, file)
            }
            Admission::AfterOpen => {
                let (response, file) = self.open(&destination).await?;
                let permit = self.ctx.gate.acquire().await?;
                (permit, response, file)
            }
        };

        info!("Started download: {} -> {}", self.task.url, destination.display());
        let _ = self.ctx.event_tx.send(BatchEvent::TaskStarted {
            index: self.task.index,
            url: self.task.url.clone(),
            total: response.content_length(),
        });

        self.copy(response, &mut file, permit).await
    }

    /// Open the remote stream and the destination file
    async fn open(&self, destination: &Path) -> Result<(Response, File), LoaderError> {
        let url = url::Url::parse(&self.task.url)
            .map_err(|_| LoaderError::InvalidUrl(self.task.url.clone()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(LoaderError::InvalidUrl(self.task.url.clone()));
        }

        let response = self.ctx.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LoaderError::ServerError {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string(),
            });
        }

        let file = File::create(destination).await?;
        Ok((response, file))
    }

    /// Copy the body in metered chunks while holding the slot
    async fn copy(
        &mut self,
        response: Response,
        file: &mut File,
        permit: GatePermit,
    ) -> Result<(), LoaderError> {
        let mut stream = response.bytes_stream();
        let mut last_progress = Instant::now();

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result?;

            for piece in chunk.chunks(self.ctx.chunk_size) {
                self.ctx.rate_limiter.acquire(piece.len() as u64).await;
                file.write_all(piece).await?;
                self.bytes_written += piece.len() as u64;
            }

            if last_progress.elapsed() >= PROGRESS_INTERVAL {
                let _ = self.ctx.event_tx.send(BatchEvent::TaskProgress {
                    index: self.task.index,
                    bytes_written: self.bytes_written,
                });
                last_progress = Instant::now();
            }
        }

        file.flush().await?;
        drop(permit);
        debug!("Released slot for {}", self.task.url);

        Ok(())
    }
}
