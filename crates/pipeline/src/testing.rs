//! Scripted collaborators for exercising the pipeline without a toolchain
//!
//! [`ScriptedCompiler`] encodes the flag set into the artifact location so a
//! [`ScriptedRunner`] can score the original flags. Both count their calls,
//! which is how tests observe at-most-once compilation.

use crate::collaborators::{Compiler, Runner};
use async_trait::async_trait;
use bestflags_core::{
    Artifact, CollaboratorFailure, CompileError, Cost, ExecutionError, FlagSet,
};
use parking_lot::Mutex;
use std::time::Duration;

type CompileScript = dyn Fn(&FlagSet) -> Result<Artifact, CompileError> + Send + Sync;
type RunScript = dyn Fn(&Artifact) -> Result<Cost, ExecutionError> + Send + Sync;

/// Artifact whose location round-trips to `flags`
pub fn artifact_for(flags: &FlagSet) -> Artifact {
    Artifact::new(serde_json::to_string(flags).unwrap_or_default())
}

/// The flag set an [`artifact_for`] artifact was built from
pub fn flags_of(artifact: &Artifact) -> Option<FlagSet> {
    serde_json::from_str(&artifact.location).ok()
}

pub struct ScriptedCompiler {
    script: Box<CompileScript>,
    calls: Mutex<Vec<FlagSet>>,
    delay: Duration,
}

impl ScriptedCompiler {
    pub fn new(
        script: impl Fn(&FlagSet) -> Result<Artifact, CompileError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    /// Every flag set builds
    pub fn succeeding() -> Self {
        Self::new(|flags| Ok(artifact_for(flags)))
    }

    /// Flag sets matching `predicate` fail to build, the rest succeed
    pub fn failing_when(predicate: impl Fn(&FlagSet) -> bool + Send + Sync + 'static) -> Self {
        Self::new(move |flags| {
            if predicate(flags) {
                Err(CompileError::new(
                    CollaboratorFailure::Failed { exit_code: Some(1) },
                    format!("scripted failure for {flags}"),
                ))
            } else {
                Ok(artifact_for(flags))
            }
        })
    }

    /// Hold each compilation open for `delay`
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_for(&self, flags: &FlagSet) -> usize {
        self.calls.lock().iter().filter(|f| *f == flags).count()
    }
}

#[async_trait]
impl Compiler for ScriptedCompiler {
    async fn compile(&self, flags: &FlagSet) -> Result<Artifact, CompileError> {
        self.calls.lock().push(flags.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.script)(flags)
    }
}

pub struct ScriptedRunner {
    script: Box<RunScript>,
    calls: Mutex<Vec<String>>,
    delay: Duration,
}

impl ScriptedRunner {
    pub fn new(
        script: impl Fn(&Artifact) -> Result<Cost, ExecutionError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    /// Score the flag set an artifact was built from
    pub fn by_flags(
        cost: impl Fn(&FlagSet) -> Result<Cost, ExecutionError> + Send + Sync + 'static,
    ) -> Self {
        Self::new(move |artifact| match flags_of(artifact) {
            Some(flags) => cost(&flags),
            None => Err(ExecutionError::new(
                CollaboratorFailure::InvalidOutput,
                format!("artifact '{artifact}' was not built by a scripted compiler"),
            )),
        })
    }

    /// Score the artifact location directly
    pub fn by_location(
        cost: impl Fn(&str) -> Result<Cost, ExecutionError> + Send + Sync + 'static,
    ) -> Self {
        Self::new(move |artifact| cost(&artifact.location))
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl Runner for ScriptedRunner {
    async fn run(&self, artifact: &Artifact) -> Result<Cost, ExecutionError> {
        self.calls.lock().push(artifact.location.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.script)(artifact)
    }
}
