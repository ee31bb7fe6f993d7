//! The run stage

use crate::collaborators::Runner;
use crate::stage::{Routed, StageHandler};
use async_trait::async_trait;
use bestflags_cache::MemoCache;
use bestflags_core::{Cost, Error, ExecutionError, Result, Task, TaskStatus};
use std::sync::Arc;

/// Run outcomes by flag set checksum, failures included
pub type TestCache = MemoCache<std::result::Result<Cost, ExecutionError>>;

/// Runs each built artifact, at most once per checksum
pub struct Executor {
    runner: Arc<dyn Runner>,
    cache: Arc<TestCache>,
}

impl Executor {
    pub fn new(runner: Arc<dyn Runner>) -> Self {
        Self::with_cache(runner, Arc::new(MemoCache::new("test")))
    }

    pub fn with_cache(runner: Arc<dyn Runner>, cache: Arc<TestCache>) -> Self {
        Self { runner, cache }
    }

    pub fn cache(&self) -> &Arc<TestCache> {
        &self.cache
    }
}

#[async_trait]
impl StageHandler for Executor {
    fn stage_name(&self) -> &'static str {
        "test"
    }

    async fn handle(&self, mut task: Task) -> Result<Routed> {
        let artifact = match (task.status(), task.artifact()) {
            (TaskStatus::Built, Some(artifact)) => Arc::clone(artifact),
            (status, _) => {
                return Err(Error::pipeline(
                    self.stage_name(),
                    format!(
                        "task {} reached the executor as {status}",
                        task.checksum().short()
                    ),
                ));
            }
        };

        let runner = Arc::clone(&self.runner);
        let outcome = self
            .cache
            .get_or_compute(task.checksum(), move || async move {
                tracing::debug!(artifact = %artifact, "running");
                runner.run(&artifact).await
            })
            .await?;

        match outcome {
            Ok(cost) => {
                tracing::debug!(checksum = %task.checksum().short(), cost = %cost, "tested");
                task.mark_tested(cost)?;
            }
            Err(e) => {
                tracing::warn!(checksum = %task.checksum().short(), error = %e, "test_failed");
                task.mark_test_failed(&e)?;
            }
        }
        Ok(Routed::Forward(task))
    }
}
