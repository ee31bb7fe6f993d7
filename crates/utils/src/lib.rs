//! Shared utilities for bestflags
//!
//! Tracing setup and structured event helpers used by every crate, plus
//! atomic file writes for reports.

pub mod atomic_file;
pub mod tracing;

pub use atomic_file::*;
