//! Core domain types and errors for the `bestflags` flag search engine.
//!
//! This crate holds the building blocks every other crate in the workspace
//! shares: the flag set model and its checksum, the cost measure, the
//! artifact handle produced by a compile, and the `Task` that carries one
//! candidate through the build and execution stages.
//!
//! ## Key Components
//!
//! - **`errors`**: the `Error` enum and `Result` alias for structural and
//!   configuration failures, plus the `CompileError`/`ExecutionError` values
//!   that collaborators report and that are recorded on tasks.
//! - **`types`**: `FlagSet`, `FlagValue`, `Checksum`, `Cost`, `Artifact` and
//!   `Task` with its enforced status transitions.

pub mod errors;
pub mod types;

pub use self::{
    errors::{CollaboratorFailure, CompileError, Error, ExecutionError, Result},
    types::*,
};
