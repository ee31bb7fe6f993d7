use crate::output::OutputFormat;
use bestflags_config::FlagCatalog;
use bestflags_core::{Error, Result};
use std::path::Path;

pub fn execute(path: &Path, format: OutputFormat) -> Result<()> {
    let catalog = FlagCatalog::load(path)?;
    match format {
        OutputFormat::Text => {
            for spec in catalog.iter() {
                println!("{spec}");
            }
        }
        OutputFormat::Json => {
            let specs: Vec<_> = catalog.iter().collect();
            let json = serde_json::to_string_pretty(&specs).map_err(|e| Error::Json {
                message: "failed to render catalog".to_string(),
                source: e,
            })?;
            println!("{json}");
        }
    }
    Ok(())
}
