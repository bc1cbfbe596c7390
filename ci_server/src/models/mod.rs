//! CI data models.

pub mod build;
pub mod push_event;
pub mod test_result;
pub mod validation;

pub use build::{BuildRecord, BuildVerdict, CommitState, VerdictState};
pub use push_event::PushEvent;
pub use test_result::{TestOutcome, TestResult};
pub use validation::ValidationResult;
