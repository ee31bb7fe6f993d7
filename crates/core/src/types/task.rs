//! The unit of pipeline work: one candidate flag set and its results

use super::{Artifact, Checksum, Cost, FlagSet};
use crate::errors::{CompileError, Error, ExecutionError, Result};
use std::fmt;
use std::sync::Arc;

/// Where a task is in its build-then-run lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Pending,
    Built,
    BuildFailed,
    Tested,
    TestFailed,
}

impl TaskStatus {
    /// Whether the task has reached a terminal status
    pub fn is_resolved(self) -> bool {
        matches!(
            self,
            TaskStatus::BuildFailed | TaskStatus::Tested | TaskStatus::TestFailed
        )
    }

    /// Legal transitions: Pending -> Built | BuildFailed, Built -> Tested | TestFailed
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Built)
                | (TaskStatus::Pending, TaskStatus::BuildFailed)
                | (TaskStatus::Built, TaskStatus::Tested)
                | (TaskStatus::Built, TaskStatus::TestFailed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Built => "built",
            TaskStatus::BuildFailed => "build-failed",
            TaskStatus::Tested => "tested",
            TaskStatus::TestFailed => "test-failed",
        };
        f.write_str(label)
    }
}

/// One candidate flag set moving through the pipeline.
///
/// Fields are append-only: each transition sets its fields exactly once and
/// nothing is ever reverted. The checksum is computed at construction and
/// never recomputed.
#[derive(Debug, Clone)]
pub struct Task {
    flags: FlagSet,
    checksum: Checksum,
    status: TaskStatus,
    artifact: Option<Arc<Artifact>>,
    cost: Option<Cost>,
    failure: Option<String>,
}

impl Task {
    /// Create a pending task for a flag set
    pub fn new(flags: FlagSet) -> Self {
        let checksum = flags.checksum();
        Self {
            flags,
            checksum,
            status: TaskStatus::Pending,
            artifact: None,
            cost: None,
            failure: None,
        }
    }

    pub fn flags(&self) -> &FlagSet {
        &self.flags
    }

    pub fn checksum(&self) -> &Checksum {
        &self.checksum
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn artifact(&self) -> Option<&Arc<Artifact>> {
        self.artifact.as_ref()
    }

    /// The measured cost, once resolved
    pub fn cost(&self) -> Option<Cost> {
        self.cost
    }

    /// Collaborator failure message for failed tasks
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn is_resolved(&self) -> bool {
        self.status.is_resolved()
    }

    /// Record a successful build
    pub fn mark_built(&mut self, artifact: Arc<Artifact>) -> Result<()> {
        self.transition(TaskStatus::Built)?;
        self.artifact = Some(artifact);
        Ok(())
    }

    /// Record a failed build; the task is resolved with infinite cost
    pub fn mark_build_failed(&mut self, error: &CompileError) -> Result<()> {
        self.transition(TaskStatus::BuildFailed)?;
        self.cost = Some(Cost::INFINITE);
        self.failure = Some(error.to_string());
        Ok(())
    }

    /// Record a measured cost
    pub fn mark_tested(&mut self, cost: Cost) -> Result<()> {
        self.transition(TaskStatus::Tested)?;
        self.cost = Some(cost);
        Ok(())
    }

    /// Record a failed run; the task is resolved with infinite cost
    pub fn mark_test_failed(&mut self, error: &ExecutionError) -> Result<()> {
        self.transition(TaskStatus::TestFailed)?;
        self.cost = Some(Cost::INFINITE);
        self.failure = Some(error.to_string());
        Ok(())
    }

    fn transition(&mut self, next: TaskStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::illegal_transition("task", self.status, next));
        }
        tracing::trace!(
            checksum = %self.checksum.short(),
            from = %self.status,
            to = %next,
            "task_transition"
        );
        self.status = next;
        Ok(())
    }
}
