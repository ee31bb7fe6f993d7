//! The compile stage

use crate::collaborators::Compiler;
use crate::stage::{Routed, StageHandler};
use async_trait::async_trait;
use bestflags_cache::MemoCache;
use bestflags_core::{Artifact, CompileError, Error, Result, Task, TaskStatus};
use std::sync::Arc;

/// Compile outcomes by flag set checksum, failures included
pub type BuildCache = MemoCache<std::result::Result<Arc<Artifact>, CompileError>>;

/// Compiles each task's flag set, at most once per checksum.
///
/// Built tasks continue to the executor. Tasks whose build failed are
/// routed straight to the completion queue since there is nothing to run.
pub struct Builder {
    compiler: Arc<dyn Compiler>,
    cache: Arc<BuildCache>,
}

impl Builder {
    pub fn new(compiler: Arc<dyn Compiler>) -> Self {
        Self::with_cache(compiler, Arc::new(MemoCache::new("build")))
    }

    /// Share an existing cache, e.g. across pipeline runs
    pub fn with_cache(compiler: Arc<dyn Compiler>, cache: Arc<BuildCache>) -> Self {
        Self { compiler, cache }
    }

    pub fn cache(&self) -> &Arc<BuildCache> {
        &self.cache
    }
}

#[async_trait]
impl StageHandler for Builder {
    fn stage_name(&self) -> &'static str {
        "build"
    }

    async fn handle(&self, mut task: Task) -> Result<Routed> {
        if task.status() != TaskStatus::Pending {
            return Err(Error::pipeline(
                self.stage_name(),
                format!(
                    "task {} reached the builder as {}",
                    task.checksum().short(),
                    task.status()
                ),
            ));
        }

        let compiler = Arc::clone(&self.compiler);
        let flags = task.flags().clone();
        let outcome = self
            .cache
            .get_or_compute(task.checksum(), move || async move {
                tracing::debug!(flags = %flags, "compiling");
                compiler.compile(&flags).await.map(Arc::new)
            })
            .await?;

        match outcome {
            Ok(artifact) => {
                task.mark_built(artifact)?;
                Ok(Routed::Forward(task))
            }
            Err(e) => {
                tracing::warn!(checksum = %task.checksum().short(), error = %e, "build_failed");
                task.mark_build_failed(&e)?;
                Ok(Routed::Complete(task))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedCompiler;
    use bestflags_core::{FlagSet, FlagValue};

    fn flags(level: i64) -> FlagSet {
        FlagSet::from_iter([("opt_level", FlagValue::Int(level))])
    }

    #[tokio::test]
    async fn equal_flag_sets_share_one_artifact() {
        let compiler = Arc::new(ScriptedCompiler::succeeding());
        let builder = Builder::new(compiler.clone());

        let first = builder.handle(Task::new(flags(2))).await.unwrap();
        let second = builder.handle(Task::new(flags(2))).await.unwrap();
        let (Routed::Forward(first), Routed::Forward(second)) = (first, second) else {
            panic!("built tasks must be forwarded");
        };

        assert_eq!(compiler.calls(), 1);
        assert!(Arc::ptr_eq(
            first.artifact().unwrap(),
            second.artifact().unwrap()
        ));
        assert_eq!(first.status(), TaskStatus::Built);
    }

    #[tokio::test]
    async fn failed_builds_bypass_the_executor() {
        let compiler = Arc::new(ScriptedCompiler::failing_when(|flags| {
            flags.get("opt_level") == Some(FlagValue::Int(3))
        }));
        let builder = Builder::new(compiler.clone());

        for _ in 0..2 {
            match builder.handle(Task::new(flags(3))).await.unwrap() {
                Routed::Complete(task) => {
                    assert_eq!(task.status(), TaskStatus::BuildFailed);
                    assert!(task.failure().is_some());
                }
                Routed::Forward(_) => panic!("failed build was forwarded"),
            }
        }
        assert_eq!(compiler.calls(), 1);
    }

    #[tokio::test]
    async fn rejects_tasks_that_are_already_built() {
        let builder = Builder::new(Arc::new(ScriptedCompiler::succeeding()));
        let Routed::Forward(built) = builder.handle(Task::new(flags(1))).await.unwrap() else {
            panic!("expected forward");
        };
        let err = builder.handle(built).await.unwrap_err();
        assert!(err.is_structural());
    }
}
