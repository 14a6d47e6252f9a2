//! Output formatting utilities

use crate::OutputFormat;
use batchload_types::{BatchReport, TaskStatus};
use console::style;

/// Print the result of a batch in the specified format
pub fn print_report(report: &BatchReport, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
            return Ok(());
        }
        OutputFormat::Table => {
            use tabled::{Table, Tabled};

            #[derive(Tabled)]
            struct TaskRow {
                #[tabled(rename = "#")]
                index: usize,
                url: String,
                status: String,
                size: String,
                error: String,
            }

            let rows: Vec<TaskRow> = report
                .outcomes
                .iter()
                .map(|o| TaskRow {
                    index: o.index + 1,
                    url: o.url.clone(),
                    status: format!("{:?}", o.status),
                    size: format_bytes(o.bytes_written),
                    error: o.error.clone().unwrap_or_default(),
                })
                .collect();

            println!("{}", Table::new(rows));
        }
        OutputFormat::Human => {
            for outcome in report.outcomes.iter().filter(|o| !o.is_success()) {
                let icon = match outcome.status {
                    TaskStatus::Interrupted => style("○").dim(),
                    _ => style("✗").red(),
                };
                println!(
                    "{} {}: {}",
                    icon,
                    outcome.url,
                    outcome.error.as_deref().unwrap_or("Unknown error")
                );
            }
            println!("{}", summary_line(report));
        }
    }

    if report.interrupted {
        println!("{}", style("Interrupted before every download finished").yellow());
    }
    println!("Elapsed: {} s.", report.elapsed_seconds());

    Ok(())
}

/// `N of M file(s) downloaded`, counted against every URL of the batch
pub fn summary_line(report: &BatchReport) -> String {
    let mut line = format!(
        "{} of {} file(s) downloaded, {}",
        style(report.succeeded()).bold(),
        report.url_count,
        format_bytes(report.total_bytes())
    );
    if report.unreported() > 0 {
        line.push_str(&format!(", {} still running", report.unreported()));
    }
    line
}

/// Format bytes as human-readable
pub fn format_bytes(bytes: u64) -> String {
    human_bytes::human_bytes(bytes as f64)
}

/// Byte count for a finished task
pub fn describe_bytes(bytes: u64) -> String {
    if bytes == 0 {
        "nothing written".to_string()
    } else {
        format_bytes(bytes)
    }
}
