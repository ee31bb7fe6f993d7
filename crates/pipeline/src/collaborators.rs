//! The two external collaborators the pipeline drives

use async_trait::async_trait;
use bestflags_core::{Artifact, CompileError, Cost, ExecutionError, FlagSet};

/// Turns a flag set into a runnable artifact
#[async_trait]
pub trait Compiler: Send + Sync {
    async fn compile(&self, flags: &FlagSet) -> Result<Artifact, CompileError>;
}

/// Runs an artifact and measures its cost (lower is better)
#[async_trait]
pub trait Runner: Send + Sync {
    async fn run(&self, artifact: &Artifact) -> Result<Cost, ExecutionError>;
}
