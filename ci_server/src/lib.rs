//! Push CI — a minimal continuous-integration server.
//!
//! Receives GitHub push webhooks, checks out the pushed commit, validates
//! Python syntax, runs the test suite, reports a commit status and keeps a
//! browsable build history.

pub mod config;
pub mod error;
pub mod events;
pub mod metrics;
pub mod models;
pub mod routes;
pub mod services;
