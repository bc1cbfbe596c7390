//! Build lifecycle tracking.
//!
//! A run's stage is the source of truth for what the orchestrator may do
//! next; transitions are validated and logged.

pub mod build;

pub use build::{BuildLifecycle, BuildStage};
