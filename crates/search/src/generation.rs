//! One round of candidates and the link to the round it came from

use crate::operator::SearchOperator;
use bestflags_core::{Checksum, Cost, Error, FlagSet, Result, Task};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Checksums of every flag set proposed so far in a search
#[derive(Debug, Clone, Default)]
pub struct SeenChecksums(HashSet<Checksum>);

impl SeenChecksums {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a checksum; `false` if it was already present
    pub fn insert(&mut self, checksum: Checksum) -> bool {
        self.0.insert(checksum)
    }

    pub fn contains(&self, checksum: &Checksum) -> bool {
        self.0.contains(checksum)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A pool of tasks with unique checksums, plus the generation it was
/// expanded from
pub struct Generation {
    index: usize,
    pool: Vec<Task>,
    parent: Option<Arc<Generation>>,
    operator: Arc<dyn SearchOperator>,
}

impl Generation {
    /// The first generation: a single task for `flags`
    pub fn seed(
        flags: FlagSet,
        operator: Arc<dyn SearchOperator>,
        seen: &mut SeenChecksums,
    ) -> Self {
        Self::seed_pool([flags], operator, seen)
    }

    /// The first generation from several flag sets; repeats are dropped
    pub fn seed_pool(
        pool: impl IntoIterator<Item = FlagSet>,
        operator: Arc<dyn SearchOperator>,
        seen: &mut SeenChecksums,
    ) -> Self {
        let pool = pool
            .into_iter()
            .map(Task::new)
            .filter(|task| seen.insert(task.checksum().clone()))
            .collect();
        Self {
            index: 0,
            pool,
            parent: None,
            operator,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn pool(&self) -> &[Task] {
        &self.pool
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    pub fn parent(&self) -> Option<&Arc<Generation>> {
        self.parent.as_ref()
    }

    /// Propose a successor generation from this one's ranked tasks.
    ///
    /// Proposals whose checksum is already in `seen` are dropped and the
    /// rest are added to it, so no flag set is ever proposed twice in a
    /// search. An empty result means the frontier is exhausted.
    pub fn next(self: &Arc<Self>, seen: &mut SeenChecksums) -> Result<Generation> {
        let ranked = self.ranked()?;
        let proposals = self.operator.propose(&ranked, seen);
        let pool: Vec<Task> = proposals
            .into_iter()
            .map(Task::new)
            .filter(|task| seen.insert(task.checksum().clone()))
            .collect();

        tracing::debug!(
            generation = self.index + 1,
            tasks = pool.len(),
            seen = seen.len(),
            "generation expanded"
        );
        Ok(Generation {
            index: self.index + 1,
            pool,
            parent: Some(Arc::clone(self)),
            operator: Arc::clone(&self.operator),
        })
    }

    /// The lowest-cost task, the earliest one on ties.
    ///
    /// Fails if any task is unresolved; `None` only for an empty pool.
    pub fn get_best(&self) -> Result<Option<&Task>> {
        Ok(self.ranked()?.first().copied())
    }

    /// Every task ordered by cost, ties in pool order. Fails if any task
    /// is unresolved.
    pub fn ranked(&self) -> Result<Vec<&Task>> {
        let pending = self.pending();
        if pending > 0 {
            return Err(Error::unresolved(
                format!("rank the tasks of generation {}", self.index),
                pending,
            ));
        }
        let mut ranked: Vec<&Task> = self.pool.iter().collect();
        ranked.sort_by_key(|task| cost_of(task));
        Ok(ranked)
    }

    /// Whether this generation's best strictly beats its parent's best.
    /// A generation without a parent always improves.
    pub fn improve(&self) -> Result<bool> {
        let Some(best) = self.get_best()? else {
            return Ok(false);
        };
        let Some(parent) = &self.parent else {
            return Ok(true);
        };
        Ok(match parent.get_best()? {
            Some(parent_best) => cost_of(best).improves_on(cost_of(parent_best)),
            None => true,
        })
    }

    /// Replace the pooled task with the same checksum by its resolved form
    pub fn update_task(&mut self, task: Task) -> Result<()> {
        let index = self.index;
        let slot = self
            .pool
            .iter_mut()
            .find(|pooled| pooled.checksum() == task.checksum())
            .ok_or_else(|| {
                Error::pipeline(
                    "generation",
                    format!(
                        "task {} does not belong to generation {index}",
                        task.checksum().short()
                    ),
                )
            })?;
        if slot.is_resolved() {
            return Err(Error::pipeline(
                "generation",
                format!(
                    "task {} of generation {index} was resolved twice",
                    task.checksum().short()
                ),
            ));
        }
        *slot = task;
        Ok(())
    }

    /// Whether every task in the pool is resolved
    pub fn is_done(&self) -> bool {
        self.pending() == 0
    }

    fn pending(&self) -> usize {
        self.pool.iter().filter(|task| !task.is_resolved()).count()
    }
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Generation")
            .field("index", &self.index)
            .field("pool", &self.pool)
            .field("parent", &self.parent.as_ref().map(|p| p.index))
            .finish_non_exhaustive()
    }
}

/// Resolved tasks always carry a cost; treat a missing one as a failure.
fn cost_of(task: &Task) -> Cost {
    task.cost().unwrap_or(Cost::INFINITE)
}
