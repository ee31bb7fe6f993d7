//! The search loop: evaluate a generation, decide whether to go on

use crate::generation::{Generation, SeenChecksums};
use crate::operator::SearchOperator;
use bestflags_cache::CacheStatSnapshot;
use bestflags_config::SteeringConfig;
use bestflags_core::{Checksum, Cost, Error, FlagSet, Result, TaskStatus};
use bestflags_pipeline::Pipeline;
use bestflags_utils::tracing::{generation_span, search_span, task_completed};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// Lifecycle of a search run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SteeringState {
    Running,
    Converged,
    Exhausted,
    Done,
    /// A run ended in an error; the search cannot be resumed
    Failed,
}

impl SteeringState {
    /// Running -> Running | Converged | Exhausted | Failed,
    /// Converged | Exhausted -> Done
    pub fn can_transition_to(self, next: SteeringState) -> bool {
        matches!(
            (self, next),
            (SteeringState::Running, SteeringState::Running)
                | (SteeringState::Running, SteeringState::Converged)
                | (SteeringState::Running, SteeringState::Exhausted)
                | (SteeringState::Running, SteeringState::Failed)
                | (SteeringState::Converged, SteeringState::Done)
                | (SteeringState::Exhausted, SteeringState::Done)
        )
    }
}

/// Why the search stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    /// Every neighbor of the best flag set had already been evaluated
    EmptyFrontier,
    /// `patience` consecutive generations failed to improve
    NoImprovement,
    /// The generation budget ran out
    MaxGenerations,
}

impl StopReason {
    fn final_state(self) -> SteeringState {
        match self {
            StopReason::EmptyFrontier | StopReason::NoImprovement => SteeringState::Converged,
            StopReason::MaxGenerations => SteeringState::Exhausted,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StopReason::EmptyFrontier => "converged: no unexplored neighbors",
            StopReason::NoImprovement => "converged: no improvement",
            StopReason::MaxGenerations => "exhausted: generation limit reached",
        };
        f.write_str(label)
    }
}

/// The best flag set found and where
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestResult {
    pub flags: FlagSet,
    pub checksum: Checksum,
    pub cost: Cost,
    /// Index of the generation that first produced it
    pub generation: usize,
}

/// Outcome of a finished search
#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    /// `None` when no flag set ever built and ran successfully
    pub best: Option<BestResult>,
    pub stop_reason: StopReason,
    /// Generations evaluated, the seed included
    pub rounds: usize,
    /// Distinct flag sets evaluated
    pub evaluated: usize,
    pub build_failures: usize,
    pub test_failures: usize,
    pub build_cache: CacheStatSnapshot,
    pub test_cache: CacheStatSnapshot,
    pub elapsed_ms: u64,
}

impl fmt::Display for SearchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.best {
            Some(best) => {
                writeln!(f, "best flags: {}", best.flags)?;
                writeln!(f, "cost:       {}", best.cost)?;
                writeln!(f, "found in:   generation {}", best.generation)?;
            }
            None => writeln!(f, "no improvement found")?,
        }
        writeln!(f, "stopped:    {}", self.stop_reason)?;
        writeln!(
            f,
            "explored:   {} flag sets in {} generations ({} build failures, {} test failures)",
            self.evaluated, self.rounds, self.build_failures, self.test_failures
        )?;
        write!(
            f,
            "caches:     build {} hits / {} misses, test {} hits / {} misses",
            self.build_cache.hits,
            self.build_cache.misses,
            self.test_cache.hits,
            self.test_cache.misses
        )
    }
}

#[derive(Debug, Default)]
struct Tally {
    evaluated: usize,
    build_failures: usize,
    test_failures: usize,
    best: Option<BestResult>,
}

impl Tally {
    fn record(&mut self, generation: &Generation) -> Result<()> {
        for task in generation.pool() {
            self.evaluated += 1;
            let cost = task.cost().unwrap_or(Cost::INFINITE);
            match task.status() {
                TaskStatus::BuildFailed => self.build_failures += 1,
                TaskStatus::TestFailed => self.test_failures += 1,
                _ => {}
            }
            task_completed(
                task.checksum().short(),
                &task.status().to_string(),
                cost.value(),
                task.status() == TaskStatus::Tested,
            );
        }

        if let Some(best) = generation.get_best()? {
            let cost = best.cost().unwrap_or(Cost::INFINITE);
            let improves = match &self.best {
                Some(current) => cost.improves_on(current.cost),
                None => cost.is_finite(),
            };
            if improves {
                self.best = Some(BestResult {
                    flags: best.flags().clone(),
                    checksum: best.checksum().clone(),
                    cost,
                    generation: generation.index(),
                });
            }
        }
        Ok(())
    }
}

/// Drives generations through the pipeline until the search stops
pub struct Steering {
    pipeline: Pipeline,
    operator: Arc<dyn SearchOperator>,
    max_generations: usize,
    patience: usize,
    state: SteeringState,
    seen: SeenChecksums,
}

impl Steering {
    pub fn new(
        pipeline: Pipeline,
        operator: Arc<dyn SearchOperator>,
        config: &SteeringConfig,
    ) -> Self {
        Self {
            pipeline,
            operator,
            max_generations: config.max_generations.max(1),
            patience: config.patience.max(1),
            state: SteeringState::Running,
            seen: SeenChecksums::new(),
        }
    }

    pub fn state(&self) -> SteeringState {
        self.state
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Search from `start` and report the best flag set found
    pub async fn run(&mut self, start: FlagSet) -> Result<SearchReport> {
        self.run_pool(vec![start]).await
    }

    /// Search from a first generation of several flag sets.
    ///
    /// A steering runs once. A search that fails part way leaves it
    /// [`SteeringState::Failed`], and every further run is rejected.
    pub async fn run_pool(&mut self, pool: Vec<FlagSet>) -> Result<SearchReport> {
        if self.state != SteeringState::Running {
            return Err(Error::illegal_transition("steering", self.state, SteeringState::Running));
        }
        if pool.is_empty() {
            return Err(Error::configuration("the first generation has no flag sets"));
        }
        let span = search_span(pool.len(), self.max_generations);
        let result = self.search(pool).instrument(span).await;
        if let Err(err) = &result {
            tracing::error!(error = %err, from = ?self.state, "search_failed");
            self.state = SteeringState::Failed;
        }
        result
    }

    async fn search(&mut self, pool: Vec<FlagSet>) -> Result<SearchReport> {
        let started = Instant::now();
        let mut tally = Tally::default();
        let mut rounds = 0;
        let mut stale = 0;
        let mut generation =
            Generation::seed_pool(pool, Arc::clone(&self.operator), &mut self.seen);

        let stop_reason = loop {
            let span = generation_span(generation.index(), generation.len());
            let evaluated = self.evaluate(generation).instrument(span).await?;
            rounds += 1;
            tally.record(&evaluated)?;

            let improved = evaluated.improve()?;
            stale = if improved { 0 } else { stale + 1 };
            tracing::info!(
                generation = evaluated.index(),
                tasks = evaluated.len(),
                improved,
                best_cost = %tally.best.as_ref().map_or(Cost::INFINITE, |b| b.cost),
                "generation_completed"
            );

            if stale >= self.patience {
                break StopReason::NoImprovement;
            }
            if rounds >= self.max_generations {
                break StopReason::MaxGenerations;
            }

            let next = evaluated.next(&mut self.seen)?;
            if next.is_empty() {
                break StopReason::EmptyFrontier;
            }
            self.transition(SteeringState::Running)?;
            generation = next;
        };

        self.transition(stop_reason.final_state())?;
        self.transition(SteeringState::Done)?;

        let report = SearchReport {
            best: tally.best,
            stop_reason,
            rounds,
            evaluated: tally.evaluated,
            build_failures: tally.build_failures,
            test_failures: tally.test_failures,
            build_cache: self.pipeline.build_cache().stats(),
            test_cache: self.pipeline.test_cache().stats(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        tracing::info!(
            stop_reason = %report.stop_reason,
            rounds = report.rounds,
            evaluated = report.evaluated,
            "search_finished"
        );
        Ok(report)
    }

    /// Push one generation through the pipeline and fold the results back in
    async fn evaluate(&self, mut generation: Generation) -> Result<Arc<Generation>> {
        let outcome = self.pipeline.run_batch(generation.pool().to_vec()).await?;
        for task in outcome.tasks {
            generation.update_task(task)?;
        }
        if !generation.is_done() {
            return Err(Error::unresolved(
                format!("complete generation {}", generation.index()),
                generation.pool().iter().filter(|t| !t.is_resolved()).count(),
            ));
        }
        Ok(Arc::new(generation))
    }

    fn transition(&mut self, next: SteeringState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::illegal_transition("steering", self.state, next));
        }
        tracing::trace!(from = ?self.state, to = ?next, "steering_transition");
        self.state = next;
        Ok(())
    }
}
