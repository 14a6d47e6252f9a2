//! Batchload Core - Download Engine
//!
//! Downloads a list of URLs into a directory while bounding both the number
//! of simultaneous transfers and the aggregate transfer rate.
//!
//! ```no_run
//! use batchload_core::{load, BatchConfig};
//!
//! # async fn example() -> Result<(), batchload_core::LoaderError> {
//! let config = BatchConfig::new(vec!["https://example.com/a.bin".into()], "downloads");
//! let report = load(config).await?;
//! println!("Elapsed: {} s", report.elapsed_seconds());
//! # Ok(())
//! # }
//! ```

pub mod engine;
mod error;
pub mod source;
pub mod storage;

pub use engine::{load, validate, BatchLoader};
pub use error::*;

pub use batchload_types::{
    Admission, BatchConfig, BatchEvent, BatchReport, TaskOutcome, TaskStatus,
};
