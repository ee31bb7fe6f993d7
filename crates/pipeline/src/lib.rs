//! The build-then-run pipeline
//!
//! Tasks flow through two [`PipelineStage`]s connected by bounded queues:
//! the [`Builder`] compiles each flag set and the [`Executor`] benchmarks
//! the resulting artifact. Both stages memoize their collaborator by flag
//! set checksum, so a flag set is compiled and run at most once per search.
//! A batch ends with a single [`PipelineMessage::PoisonPill`] that every
//! stage forwards exactly once, after all of its workers have stopped.

pub mod builder;
pub mod collaborators;
pub mod command;
pub mod executor;
pub mod message;
pub mod pipeline;
pub mod stage;
pub mod testing;

pub use builder::{BuildCache, Builder};
pub use collaborators::{Compiler, Runner};
pub use command::{CommandCompiler, CommandRunner};
pub use executor::{Executor, TestCache};
pub use message::PipelineMessage;
pub use pipeline::{BatchOutcome, Pipeline, PipelineConfig, PipelineRun};
pub use stage::{PipelineStage, Routed, StageHandler, StageOutputs, StageReport};
