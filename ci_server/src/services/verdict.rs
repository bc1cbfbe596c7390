//! Verdict resolution — combines validation and test results into the one
//! terminal state of a build.
//!
//! Precedence is fixed: syntax errors win over everything and yield
//! `failure`; a missing, empty or failing test run yields `error`; only a
//! clean tree with passing tests is a `success`.

use crate::models::{BuildVerdict, TestOutcome, TestResult, ValidationResult, VerdictState};

pub fn resolve(validation: &ValidationResult, tests: Option<&TestResult>) -> BuildVerdict {
    if validation.error_count > 0 {
        let files = validation
            .failing_files
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        return verdict(
            VerdictState::Failure,
            format!("{} syntax error(s): {files}", validation.error_count),
        );
    }

    let Some(tests) = tests else {
        return verdict(VerdictState::Error, "Test suite was not run".to_string());
    };

    match tests.outcome {
        TestOutcome::NoTestsFound => verdict(VerdictState::Error, "No tests were found".to_string()),
        TestOutcome::SomeFailed => {
            let detail = tests
                .detail
                .clone()
                .unwrap_or_else(|| "test suite failed".to_string());
            verdict(VerdictState::Error, format!("Tests failed: {detail}"))
        }
        TestOutcome::AllPassed => verdict(
            VerdictState::Success,
            format!(
                "{} file(s) checked, all tests passed",
                validation.checked_files
            ),
        ),
    }
}

fn verdict(state: VerdictState, description: String) -> BuildVerdict {
    BuildVerdict::new(state, description)
}
