//! ci.validation — Result of a syntax check over a working copy.

use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    /// Number of source files that failed to parse.
    pub error_count: usize,
    /// Offending files, relative to the working copy root, in visit order.
    pub failing_files: Vec<PathBuf>,
    /// Number of source files examined.
    pub checked_files: usize,
}

impl ValidationResult {
    pub fn is_clean(&self) -> bool {
        self.error_count == 0
    }

    pub(crate) fn record_ok(&mut self) {
        self.checked_files += 1;
    }

    pub(crate) fn record_failure(&mut self, path: PathBuf) {
        self.checked_files += 1;
        self.error_count += 1;
        self.failing_files.push(path);
    }
}
