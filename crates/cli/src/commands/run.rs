use crate::output::{render, OutputFormat};
use bestflags_config::SearchConfig;
use bestflags_core::{Error, Result};
use bestflags_pipeline::{CommandCompiler, CommandRunner, Pipeline, PipelineConfig};
use bestflags_search::{initial_pool, operator_for, SearchReport, Steering};
use bestflags_utils::write_atomic_string;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Search config file (JSON)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Override steering.max_generations
    #[arg(long)]
    pub max_generations: Option<usize>,

    /// Override steering.patience
    #[arg(long)]
    pub patience: Option<usize>,

    /// Override workers.builders
    #[arg(long)]
    pub builders: Option<usize>,

    /// Override workers.executors
    #[arg(long)]
    pub executors: Option<usize>,

    /// Report format on stdout
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Also write the JSON report to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let config = resolve_config(&args, std::env::vars())?;
    let report = search(&config).await?;

    if let Some(path) = &args.output {
        write_atomic_string(path, &render(&report, OutputFormat::Json)?)?;
        tracing::info!(path = %path.display(), "report written");
    }
    println!("{}", render(&report, args.format)?);
    Ok(())
}

/// Load the config file, then apply environment and command-line overrides
pub fn resolve_config<I, K, V>(args: &RunArgs, vars: I) -> Result<SearchConfig>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut config = SearchConfig::load(&args.config)?;
    config.apply_overrides(vars)?;

    if let Some(max_generations) = args.max_generations {
        config.steering.max_generations = max_generations;
    }
    if let Some(patience) = args.patience {
        config.steering.patience = patience;
    }
    if let Some(builders) = args.builders {
        config.workers.builders = builders;
    }
    if let Some(executors) = args.executors {
        config.workers.executors = executors;
    }

    config.validate()?;
    Ok(config)
}

/// Run a full search with the configured build and test commands
pub async fn search(config: &SearchConfig) -> Result<SearchReport> {
    let catalog = Arc::new(config.catalog()?);
    let build = config
        .build
        .as_ref()
        .ok_or_else(|| Error::configuration("a 'build' command is required to run a search"))?;
    let test = config
        .test
        .as_ref()
        .ok_or_else(|| Error::configuration("a 'test' command is required to run a search"))?;

    let pipeline = Pipeline::new(
        Arc::new(CommandCompiler::from_config(build)?),
        Arc::new(CommandRunner::from_config(test)?),
        PipelineConfig::from(&config.workers),
    );
    let pool = initial_pool(&catalog, &config.steering)?;
    let operator = operator_for(Arc::clone(&catalog), &config.steering);

    tracing::info!(
        flags = catalog.len(),
        strategy = ?config.steering.strategy,
        builders = config.workers.builders,
        executors = config.workers.executors,
        seeds = pool.len(),
        "starting search"
    );
    let mut steering = Steering::new(pipeline, operator, &config.steering);
    steering.run_pool(pool).await
}
