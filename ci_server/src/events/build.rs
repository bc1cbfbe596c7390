//! Build lifecycle — the stages a pipeline run moves through.

use std::fmt;

/// Stage of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStage {
    /// Push event accepted, nothing done yet.
    Received,
    /// Working copy checked out.
    Staged,
    /// Syntax check finished.
    Validated,
    /// Test suite finished.
    Tested,
    /// Verdict computed.
    Resolved,
    /// Status report and history write attempted.
    Reported,
    /// Working copy released after a normal run.
    Done,
    /// Aborted by an unexpected error. Absorbing.
    Failed(String),
}

impl BuildStage {
    pub fn name(&self) -> &'static str {
        match self {
            BuildStage::Received => "received",
            BuildStage::Staged => "staged",
            BuildStage::Validated => "validated",
            BuildStage::Tested => "tested",
            BuildStage::Resolved => "resolved",
            BuildStage::Reported => "reported",
            BuildStage::Done => "done",
            BuildStage::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildStage::Done | BuildStage::Failed(_))
    }

    /// Whether `next` may follow `self`.
    ///
    /// `Validated → Resolved` is the syntax-error short-circuit. Any
    /// non-terminal stage may fail.
    pub fn can_advance_to(&self, next: &BuildStage) -> bool {
        use BuildStage::*;
        match (self, next) {
            (Done, _) | (Failed(_), _) => false,
            (_, Failed(_)) => true,
            (Received, Staged)
            | (Staged, Validated)
            | (Validated, Tested)
            | (Validated, Resolved)
            | (Tested, Resolved)
            | (Resolved, Reported)
            | (Reported, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStage::Failed(reason) => write!(f, "failed: {reason}"),
            other => f.write_str(other.name()),
        }
    }
}

/// Tracks the stage of one run and rejects out-of-order transitions.
#[derive(Debug, Clone)]
pub struct BuildLifecycle {
    stage: BuildStage,
    history: Vec<&'static str>,
}

impl Default for BuildLifecycle {
    fn default() -> Self {
        Self {
            stage: BuildStage::Received,
            history: vec![BuildStage::Received.name()],
        }
    }
}

impl BuildLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> &BuildStage {
        &self.stage
    }

    /// Names of every stage entered so far, in order.
    pub fn history(&self) -> &[&'static str] {
        &self.history
    }

    /// Move to `next`. Returns `false` and stays put if the move is not allowed.
    pub fn advance(&mut self, next: BuildStage) -> bool {
        if !self.stage.can_advance_to(&next) {
            tracing::warn!(from = %self.stage, to = %next, "Rejected build stage transition");
            return false;
        }
        tracing::debug!(from = self.stage.name(), to = %next, "Build stage transition");
        self.history.push(next.name());
        self.stage = next;
        true
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        self.advance(BuildStage::Failed(reason.into()))
    }
}
