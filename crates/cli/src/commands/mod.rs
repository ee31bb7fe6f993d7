use crate::output::OutputFormat;
use bestflags_core::Result;
use clap::Subcommand;
use std::path::PathBuf;

pub mod check;
pub mod flags;
pub mod run;

pub use run::RunArgs;

#[derive(Subcommand)]
pub enum Commands {
    /// Search for the lowest-cost flag set
    Run(RunArgs),

    /// Validate a search config and show the catalog and seed flag set
    Check {
        /// Search config file (JSON)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Parse a flag catalog file and list its flags
    Flags {
        /// Catalog file, one flag per line
        file: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

impl Commands {
    pub async fn execute(self) -> Result<()> {
        match self {
            Commands::Run(args) => run::execute(args).await,
            Commands::Check { config } => check::execute(&config),
            Commands::Flags { file, format } => flags::execute(&file, format),
        }
    }
}
