//! Domain types shared across the search engine

pub mod artifact;
pub mod checksum;
pub mod cost;
pub mod flags;
pub mod task;

pub use artifact::Artifact;
pub use checksum::Checksum;
pub use cost::Cost;
pub use flags::{FlagSet, FlagValue};
pub use task::{Task, TaskStatus};
