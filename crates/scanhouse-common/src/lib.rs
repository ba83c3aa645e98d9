//! Scanhouse Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared infrastructure for scanhouse workspace members.
//!
//! - **Logging**: tracing subscriber setup for console and file output

pub mod logging;

pub use logging::{init_logging, LogConfig, LogGuard};
