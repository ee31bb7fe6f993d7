//! Generation-based local search
//!
//! A [`Generation`] is a pool of candidate tasks. Its successor holds the
//! unseen flag sets a [`SearchOperator`] proposes from its ranked tasks:
//! neighbors of the best one for hill climbing, or offspring of the best
//! few for the genetic strategy.
//! [`Steering`] evaluates generations through the pipeline until the
//! frontier is empty, progress stalls or the generation budget runs out.

pub mod generation;
pub mod genetic;
pub mod operator;
pub mod seeds;
pub mod steering;

pub use generation::{Generation, SeenChecksums};
pub use genetic::GeneticOperator;
pub use operator::{operator_for, NeighborOperator, SearchOperator};
pub use seeds::{initial_pool, random_population, starting_flags};
pub use steering::{BestResult, SearchReport, Steering, SteeringState, StopReason};
