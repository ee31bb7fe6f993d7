pub mod commands;
pub mod output;

pub use commands::Commands;
pub use output::OutputFormat;
