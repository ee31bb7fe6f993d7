//! What travels on the pipeline queues

use bestflags_core::Task;

/// A queue item: either work or the end-of-batch marker.
///
/// The pill is a distinct variant rather than a sentinel task, so no real
/// task can ever be mistaken for it.
#[derive(Debug)]
pub enum PipelineMessage {
    Task(Task),
    PoisonPill,
}

impl PipelineMessage {
    pub fn is_poison_pill(&self) -> bool {
        matches!(self, PipelineMessage::PoisonPill)
    }
}

impl From<Task> for PipelineMessage {
    fn from(task: Task) -> Self {
        PipelineMessage::Task(task)
    }
}
