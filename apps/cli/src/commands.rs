//! CLI command implementations

use crate::output::print_report;
use crate::progress::DownloadProgress;
use crate::{LoadArgs, OutputFormat};
use anyhow::{Context, Result};
use batchload_core::{source, storage, Admission, BatchConfig, BatchEvent, BatchLoader};
use console::style;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::error::RecvError;

// ============================================================================
// Configuration
// ============================================================================

/// Settings file, then command-line flags on top
pub async fn resolve_config(args: &LoadArgs) -> Result<BatchConfig> {
    let mut config = match &args.config {
        Some(path) => read_config_file(path).await?,
        None => BatchConfig::default(),
    };

    if let Some(dir) = &args.save_dir {
        config.save_directory = dir.clone();
    }
    if let Some(threads) = args.threads {
        config.number_of_threads = threads;
    }
    if let Some(rate_limit) = args.rate_limit {
        config.rate_limit = rate_limit;
    }
    if let Some(chunk_size) = args.chunk_size {
        config.chunk_size = chunk_size;
    }
    if args.admit_after_open {
        config.admission = Admission::AfterOpen;
    }

    config.urls = source::read_url_list(&args.url_file).await?;

    Ok(config)
}

async fn read_config_file(path: &Path) -> Result<BatchConfig> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read settings file {}", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("Invalid settings file {}", path.display()))
}

// ============================================================================
// Load Command
// ============================================================================

pub async fn load(args: LoadArgs, progress_bars: bool, format: OutputFormat) -> Result<()> {
    let config = resolve_config(&args).await?;
    let loader = BatchLoader::new(config).await?;

    if loader.config().urls.is_empty() {
        println!("{}", style("URL list is empty, nothing to download.").dim());
        return Ok(());
    }

    let progress_task = progress_bars.then(|| {
        let mut events = loader.subscribe();
        let mut progress = DownloadProgress::new();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(BatchEvent::BatchFinished { .. }) | Err(RecvError::Closed) => break,
                    Ok(event) => progress.handle_event(&event),
                    Err(RecvError::Lagged(_)) => continue,
                }
            }
            progress.clear();
        })
    });

    let report = loader
        .load_until(async {
            // A failing signal handler just means Ctrl-C can't cut the wait short
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        })
        .await;

    if let Some(task) = progress_task {
        let _ = task.await;
    }

    print_report(&report, format)
}

// ============================================================================
// Plan Command
// ============================================================================

pub async fn plan(url_file: PathBuf, save_dir: Option<PathBuf>, format: OutputFormat) -> Result<()> {
    let urls = source::read_url_list(&url_file).await?;
    let directory = save_dir.unwrap_or_else(|| BatchConfig::default().save_directory);

    let mut seen = HashSet::new();
    let entries: Vec<_> = urls
        .iter()
        .map(|url| {
            let destination = storage::destination_for(&directory, url);
            let overwrites = destination
                .as_ref()
                .map(|d| !seen.insert(d.clone()))
                .unwrap_or(false);
            (url, destination, overwrites)
        })
        .collect();

    match format {
        OutputFormat::Json => {
            let json: Vec<_> = entries
                .iter()
                .map(|(url, destination, overwrites)| {
                    serde_json::json!({
                        "url": url,
                        "destination": destination,
                        "overwrites": overwrites,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Human | OutputFormat::Table => {
            if entries.is_empty() {
                println!("{}", style("URL list is empty, nothing to download.").dim());
                return Ok(());
            }

            for (url, destination, overwrites) in &entries {
                match destination {
                    Some(path) => {
                        let note = if *overwrites {
                            style(" (overwrites earlier entry)").yellow().to_string()
                        } else {
                            String::new()
                        };
                        println!("{} -> {}{}", url, style(path.display()).cyan(), note);
                    }
                    None => println!("{} -> {}", url, style("no file name, will fail").red()),
                }
            }
            println!();
            println!(
                "{} URL(s), {} distinct file(s) in {}",
                style(entries.len()).bold(),
                style(seen.len()).bold(),
                directory.display()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(url_file: PathBuf) -> LoadArgs {
        LoadArgs {
            url_file,
            config: None,
            save_dir: None,
            threads: None,
            rate_limit: None,
            chunk_size: None,
            admit_after_open: false,
            no_progress: true,
        }
    }

    #[tokio::test]
    async fn test_flags_override_settings_file() {
        let tmp = tempfile::tempdir().unwrap();
        let list = tmp.path().join("urls.txt");
        std::fs::write(&list, "http://x/a.bin\n\nhttp://x/b.bin\n").unwrap();
        let settings = tmp.path().join("settings.json");
        std::fs::write(
            &settings,
            r#"{"saveDirectory": "/srv/files", "numberOfThreads": 8, "rateLimit": 4096}"#,
        )
        .unwrap();

        let mut args = args(list);
        args.config = Some(settings);
        args.threads = Some(3);
        args.admit_after_open = true;

        let config = resolve_config(&args).await.unwrap();
        assert_eq!(config.urls.len(), 2);
        assert_eq!(config.save_directory, PathBuf::from("/srv/files"));
        assert_eq!(config.number_of_threads, 3);
        assert_eq!(config.rate_limit, 4096);
        assert_eq!(config.admission, Admission::AfterOpen);
    }

    #[tokio::test]
    async fn test_missing_url_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = resolve_config(&args(tmp.path().join("none.txt")))
            .await
            .unwrap_err();
        // Reaches main as a setup error, not a per-download failure
        let loader_err = err.downcast_ref::<batchload_core::LoaderError>().unwrap();
        assert!(loader_err.is_fatal());
    }
}
