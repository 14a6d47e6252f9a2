//! Download Engine
//!
//! Bounded, rate-limited batch downloads:
//! - One tokio task per URL, launched eagerly
//! - Concurrency gate bounding simultaneous transfers
//! - Token bucket rate limiting shared by all transfers
//! - Countdown latch as the single completion point
//! - Per-task failure isolation

mod completion;
mod gate;
mod loader;
mod rate_limiter;
mod worker;

pub use completion::*;
pub use gate::*;
pub use loader::*;
pub use rate_limiter::*;
pub use worker::*;
