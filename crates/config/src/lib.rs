//! Configuration for bestflags
//!
//! This crate owns the flag catalog (which flags exist and which values they
//! may take) and the search configuration (steering limits, worker pools,
//! build and test commands), including file loading, environment overrides
//! and validation.

pub mod catalog;
pub mod search;

pub use catalog::*;
pub use search::*;
