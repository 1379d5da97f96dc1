//! # CacheKit Common
//!
//! Shared utilities for the CacheKit asset cache synchronizer.
//!
//! ## Features
//!
//! - Logging configuration and setup
//! - Retry policy with exponential backoff for transient network failures

pub mod logging;
pub mod retry;

pub use logging::{init_logging, LogConfig, LogFormat};
pub use retry::{retry_async, RetryPolicy};
