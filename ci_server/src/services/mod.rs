//! CI services — one module per pipeline stage plus the orchestrator.

pub mod github_service;
pub mod history;
pub mod pipeline;
pub mod process;
pub mod stager;
pub mod test_runner;
pub mod validator;
pub mod verdict;
