//! Rendering results for the terminal or for machines

use bestflags_core::{Error, Result};
use clap::ValueEnum;
use serde::Serialize;
use std::fmt::Display;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
}

/// Render `value` in the requested format
pub fn render<T: Serialize + Display>(value: &T, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(value.to_string()),
        OutputFormat::Json => serde_json::to_string_pretty(value).map_err(|e| Error::Json {
            message: "failed to render output".to_string(),
            source: e,
        }),
    }
}
