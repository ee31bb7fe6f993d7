//! Search configuration with file loading, environment overrides and validation
//!
//! Precedence, lowest first: built-in defaults, the JSON config file,
//! `BESTFLAGS_*` environment variables, command-line flags (applied by the
//! CLI on top of whatever this module returns).

use crate::catalog::{FlagCatalog, FlagSpec};
use bestflags_core::{Error, FlagSet, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default number of generations, the seed generation included
pub const DEFAULT_MAX_GENERATIONS: usize = 50;
/// Default number of consecutive non-improving generations tolerated
pub const DEFAULT_PATIENCE: usize = 1;
/// Default per-command timeout
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 600;
/// Default genetic population size
pub const DEFAULT_POPULATION: usize = 10;
/// Default per-flag mutation probability
pub const DEFAULT_MUTATION_RATE: f64 = 0.03;
/// Default number of consecutive duplicate offspring before a generation is closed
pub const DEFAULT_TRIALS: usize = 20;

const ENV_PREFIX: &str = "BESTFLAGS_";

/// How neighbors of a flag set are enumerated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topology {
    /// Move one flag one state up or down
    #[default]
    Step,
    /// Move one flag to any other of its states
    AllValues,
}

/// How successor generations are proposed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Neighbors of the best flag set, per [`Topology`]
    #[default]
    HillClimb,
    /// Crossover and mutation over the best flag sets of a generation
    Genetic,
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "hill-climb" => Ok(Strategy::HillClimb),
            "genetic" => Ok(Strategy::Genetic),
            other => Err(format!("unknown strategy '{other}'")),
        }
    }
}

/// Settings of the genetic strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneticConfig {
    /// Flag sets per generation, and parents kept for breeding
    pub population: usize,
    /// Probability that one flag of an offspring is redrawn
    pub mutation_rate: f64,
    /// Consecutive duplicate offspring tolerated while filling a generation
    pub trials: usize,
}

impl Default for GeneticConfig {
    fn default() -> Self {
        Self {
            population: DEFAULT_POPULATION,
            mutation_rate: DEFAULT_MUTATION_RATE,
            trials: DEFAULT_TRIALS,
        }
    }
}

/// Where the search starts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StartingPoint {
    /// No optional flags; required flags at their first value
    #[default]
    Empty,
    /// Every flag at its largest value, toggles on
    All,
    /// Each flag in a uniformly chosen state (seeded)
    Random,
    /// A specific flag set
    Explicit { flags: FlagSet },
}

/// Where a configuration was loaded from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    #[default]
    Default,
    ConfigFile(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringConfig {
    /// Upper bound on evaluated generations, the seed included
    pub max_generations: usize,
    /// Consecutive non-improving generations before converging
    pub patience: usize,
    pub strategy: Strategy,
    pub topology: Topology,
    pub genetic: GeneticConfig,
    pub start: StartingPoint,
    /// Seed for the random starting point and the genetic strategy
    pub seed: u64,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            max_generations: DEFAULT_MAX_GENERATIONS,
            patience: DEFAULT_PATIENCE,
            strategy: Strategy::default(),
            topology: Topology::default(),
            genetic: GeneticConfig::default(),
            start: StartingPoint::default(),
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Parallel compile workers
    pub builders: usize,
    /// Parallel benchmark workers
    pub executors: usize,
    /// Capacity of each stage's input queue
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            builders: 2,
            executors: 1,
            queue_capacity: 64,
        }
    }
}

/// An external command used as the compile or run collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Command line, split shell-style; flags or the artifact are appended
    pub command: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl CommandConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout_secs: None,
            working_dir: None,
            env: BTreeMap::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS))
    }
}

/// Complete configuration of one search run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Inline catalog entries
    pub flags: Vec<FlagSpec>,
    /// Catalog file in the line-oriented format, relative to the config file
    pub flags_file: Option<PathBuf>,
    pub steering: SteeringConfig,
    pub workers: WorkerConfig,
    pub build: Option<CommandConfig>,
    pub test: Option<CommandConfig>,
    #[serde(skip)]
    pub source: ConfigSource,
}

impl SearchConfig {
    /// Load a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::file_system(path, "read search config", e))?;
        let mut config: SearchConfig = serde_json::from_str(&text).map_err(|e| Error::Json {
            message: format!("failed to parse search config '{}'", path.display()),
            source: e,
        })?;

        if let (Some(flags_file), Some(dir)) = (&config.flags_file, path.parent()) {
            if flags_file.is_relative() {
                config.flags_file = Some(dir.join(flags_file));
            }
        }
        config.source = ConfigSource::ConfigFile(path.to_path_buf());
        tracing::debug!(path = %path.display(), "loaded search config");
        Ok(config)
    }

    /// Apply `BESTFLAGS_*` overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(std::env::vars())
    }

    /// Apply `BESTFLAGS_*` overrides from an explicit variable list
    pub fn apply_overrides<I, K, V>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let (key, value) = (key.as_ref(), value.as_ref());
            match name {
                "MAX_GENERATIONS" => self.steering.max_generations = parse_env(key, value)?,
                "PATIENCE" => self.steering.patience = parse_env(key, value)?,
                "SEED" => self.steering.seed = parse_env(key, value)?,
                "STRATEGY" => self.steering.strategy = parse_env(key, value)?,
                "POPULATION" => self.steering.genetic.population = parse_env(key, value)?,
                "BUILDERS" => self.workers.builders = parse_env(key, value)?,
                "EXECUTORS" => self.workers.executors = parse_env(key, value)?,
                "QUEUE_CAPACITY" => self.workers.queue_capacity = parse_env(key, value)?,
                "FLAGS_FILE" => self.flags_file = Some(PathBuf::from(value)),
                _ => continue,
            }
            tracing::debug!(variable = %key, value = %value, "config override from environment");
        }
        Ok(())
    }

    /// Reject settings the search cannot run with
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("steering.max_generations", self.steering.max_generations),
            ("steering.patience", self.steering.patience),
            ("steering.genetic.population", self.steering.genetic.population),
            ("steering.genetic.trials", self.steering.genetic.trials),
            ("workers.builders", self.workers.builders),
            ("workers.executors", self.workers.executors),
            ("workers.queue_capacity", self.workers.queue_capacity),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(Error::configuration(format!("{field} must be at least 1")));
            }
        }
        let rate = self.steering.genetic.mutation_rate;
        if !(0.0..=1.0).contains(&rate) {
            return Err(Error::configuration(format!(
                "steering.genetic.mutation_rate must be between 0 and 1, got {rate}"
            )));
        }
        for (label, command) in [("build", &self.build), ("test", &self.test)] {
            if let Some(command) = command {
                if command.command.trim().is_empty() {
                    return Err(Error::configuration(format!("{label}.command is empty")));
                }
                if command.timeout_secs == Some(0) {
                    return Err(Error::configuration(format!(
                        "{label}.timeout_secs must be at least 1"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Assemble the catalog from inline entries and the catalog file
    pub fn catalog(&self) -> Result<FlagCatalog> {
        let mut catalog = FlagCatalog::new(self.flags.iter().cloned())?;
        if let Some(path) = &self.flags_file {
            catalog.extend(FlagCatalog::load(path)?)?;
        }
        if catalog.is_empty() {
            return Err(Error::configuration(
                "no flags configured: set 'flags' or 'flags_file'",
            ));
        }
        if let StartingPoint::Explicit { flags } = &self.steering.start {
            catalog.check(flags)?;
        }
        Ok(catalog)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        Error::configuration(format!("environment variable {key} has invalid value '{value}'"))
    })
}
