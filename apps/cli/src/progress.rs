//! Progress bar utilities for CLI downloads

use crate::output::describe_bytes;
use batchload_types::{BatchEvent, TaskStatus};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;

/// Manages progress bars for the tasks of one batch
pub struct DownloadProgress {
    multi: MultiProgress,
    bars: HashMap<usize, ProgressBar>,
}

impl DownloadProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: HashMap::new(),
        }
    }

    /// Create a progress bar for a task that started transferring
    fn add_task(&mut self, index: usize, url: &str, total: Option<u64>) -> ProgressBar {
        let pb = match total {
            Some(total) => {
                let pb = self.multi.add(ProgressBar::new(total));
                if let Ok(bar_style) = ProgressStyle::default_bar().template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}) {msg}",
                ) {
                    pb.set_style(bar_style.progress_chars("█▓▒░  "));
                }
                pb
            }
            None => {
                let pb = self.multi.add(ProgressBar::new_spinner());
                if let Ok(spinner_style) = ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {bytes} ({bytes_per_sec}) {msg}")
                {
                    pb.set_style(spinner_style);
                }
                pb
            }
        };

        pb.set_message(file_label(url).to_string());
        self.bars.insert(index, pb.clone());
        pb
    }

    /// Update the bars from an engine event
    pub fn handle_event(&mut self, event: &BatchEvent) {
        match event {
            BatchEvent::TaskStarted { index, url, total } => {
                self.add_task(*index, url, *total);
            }

            BatchEvent::TaskProgress {
                index,
                bytes_written,
            } => {
                if let Some(pb) = self.bars.get(index) {
                    pb.set_position(*bytes_written);
                }
            }

            BatchEvent::TaskFinished { outcome } => {
                let label = file_label(&outcome.url).to_string();
                let line = match outcome.status {
                    TaskStatus::Completed => format!(
                        "{} {} ({})",
                        style("✓").green().bold(),
                        label,
                        describe_bytes(outcome.bytes_written)
                    ),
                    TaskStatus::Failed => format!(
                        "{} {}: {}",
                        style("✗").red().bold(),
                        label,
                        outcome.error.as_deref().unwrap_or("Unknown error")
                    ),
                    TaskStatus::Interrupted => {
                        format!("{} {}: interrupted", style("○").dim(), label)
                    }
                };

                match self.bars.remove(&outcome.index) {
                    Some(pb) if outcome.is_success() => {
                        pb.set_position(outcome.bytes_written);
                        pb.finish_with_message(line);
                    }
                    Some(pb) => pb.abandon_with_message(line),
                    // Failed before a transfer started; there is no bar to reuse
                    None => {
                        let _ = self.multi.println(line);
                    }
                }
            }

            BatchEvent::BatchFinished { .. } => {}
        }
    }

    /// Clear all remaining progress bars
    pub fn clear(&mut self) {
        for (_, pb) in self.bars.drain() {
            pb.finish_and_clear();
        }
    }
}

impl Default for DownloadProgress {
    fn default() -> Self {
        Self::new()
    }
}

fn file_label(url: &str) -> &str {
    url.rsplit('/').next().filter(|s| !s.is_empty()).unwrap_or(url)
}
