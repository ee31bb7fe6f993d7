use bestflags_config::{ConfigSource, SearchConfig, Strategy};
use bestflags_core::Result;
use bestflags_search::starting_flags;
use std::path::Path;

pub fn execute(path: &Path) -> Result<()> {
    let mut config = SearchConfig::load(path)?;
    config.apply_env_overrides()?;
    config.validate()?;
    let catalog = config.catalog()?;
    let start = starting_flags(&catalog, &config.steering.start, config.steering.seed)?;

    if let ConfigSource::ConfigFile(file) = &config.source {
        println!("config:    {}", file.display());
    }
    println!("flags:     {}", catalog.len());
    for spec in catalog.iter() {
        println!("  {spec}");
    }
    println!("strategy:  {:?}", config.steering.strategy);
    match config.steering.strategy {
        Strategy::HillClimb => println!("topology:  {:?}", config.steering.topology),
        Strategy::Genetic => println!(
            "genetic:   population {}, mutation rate {}, trials {}",
            config.steering.genetic.population,
            config.steering.genetic.mutation_rate,
            config.steering.genetic.trials
        ),
    }
    println!("seed set:  {start}");
    println!(
        "limits:    {} generations, patience {}",
        config.steering.max_generations, config.steering.patience
    );
    println!(
        "workers:   {} builders, {} executors, queue capacity {}",
        config.workers.builders, config.workers.executors, config.workers.queue_capacity
    );
    for (label, command) in [("build", &config.build), ("test", &config.test)] {
        let label = format!("{label}:");
        match command {
            Some(command) => println!("{label:<11}{}", command.command),
            None => println!("{label:<11}(not configured)"),
        }
    }
    Ok(())
}
