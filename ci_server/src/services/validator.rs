//! Syntax validation — parses every Python source file in a working copy
//! with the interpreter's own `ast.parse` and counts the ones that fail.
//!
//! Nothing is executed: `ast.parse` only compiles to a syntax tree. The
//! interpreter runs isolated (`-I`) so modules in the working copy cannot
//! shadow the standard library it imports.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ValidationError;
use crate::models::ValidationResult;
use crate::services::process::{CommandRunner, CommandSpec};

/// Extension of the source files that are checked.
pub const SOURCE_EXTENSION: &str = "py";

/// Files handed to one interpreter invocation.
pub const FILES_PER_BATCH: usize = 200;

/// VCS metadata is never source.
const ALWAYS_SKIPPED: &[&str] = &[".git"];

/// Parses each path in `argv` and prints one JSON report on stdout.
pub const CHECK_SCRIPT: &str = r#"import ast, json, sys
failures = []
for path in sys.argv[1:]:
    try:
        with open(path, "rb") as f:
            ast.parse(f.read(), path)
    except Exception as e:
        failures.append({"path": path, "error": "%s: %s" % (type(e).__name__, e)})
json.dump({"checked": len(sys.argv) - 1, "failures": failures}, sys.stdout)
"#;

/// Output of one [`CHECK_SCRIPT`] run.
#[derive(Debug, Deserialize)]
struct CheckReport {
    checked: usize,
    failures: Vec<CheckFailure>,
}

#[derive(Debug, Deserialize)]
struct CheckFailure {
    path: String,
    error: String,
}

pub struct SyntaxValidator {
    runner: Arc<dyn CommandRunner>,
    python: String,
    excluded_dirs: BTreeSet<String>,
    timeout: Duration,
}

impl SyntaxValidator {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        python: impl Into<String>,
        excluded_dirs: BTreeSet<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            python: python.into(),
            excluded_dirs,
            timeout,
        }
    }

    /// Walk `root` and parse every source file outside the excluded
    /// directories.
    ///
    /// A file that does not parse (including undecodable or unreadable
    /// files) is counted in the result. `Err` means the check itself could
    /// not be carried out.
    pub async fn validate(&self, root: &Path) -> Result<ValidationResult, ValidationError> {
        let files = source_files(root, &self.excluded_dirs);
        let mut result = ValidationResult::default();

        for batch in files.chunks(FILES_PER_BATCH) {
            let failures = self.check_batch(root, batch).await?;
            for relative in batch {
                match failures.get(relative) {
                    Some(error) => {
                        tracing::info!(file = %relative.display(), %error, "Syntax error");
                        result.record_failure(relative.clone());
                    }
                    None => {
                        tracing::debug!(file = %relative.display(), "OK");
                        result.record_ok();
                    }
                }
            }
        }

        tracing::info!(
            checked = result.checked_files,
            errors = result.error_count,
            "All source files checked"
        );
        Ok(result)
    }

    async fn check_batch(
        &self,
        root: &Path,
        batch: &[PathBuf],
    ) -> Result<HashMap<PathBuf, String>, ValidationError> {
        let spec = CommandSpec::new(&self.python, root, self.timeout)
            .args(["-I", "-c", CHECK_SCRIPT])
            .args(batch.iter().map(|p| p.to_string_lossy().to_string()));
        let output = self.runner.run(&spec).await?;

        if output.timed_out {
            return Err(ValidationError::Timeout {
                secs: self.timeout.as_secs(),
            });
        }
        if !output.success() {
            return Err(ValidationError::Checker {
                command: self.python.clone(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }

        let report: CheckReport = serde_json::from_str(output.stdout.trim())?;
        if report.checked != batch.len() {
            return Err(ValidationError::Incomplete {
                expected: batch.len(),
                checked: report.checked,
            });
        }

        Ok(report
            .failures
            .into_iter()
            .map(|f| (PathBuf::from(f.path), f.error))
            .collect())
    }
}

/// Every source file under `root`, relative to it, in sorted order.
///
/// Subtrees whose directory name is in `excluded_dirs` are not descended
/// into.
pub fn source_files(root: &Path, excluded_dirs: &BTreeSet<String>) -> Vec<PathBuf> {
    let mut files = Vec::new();
    collect_sources(root, excluded_dirs, &mut files);
    let mut files: Vec<PathBuf> = files
        .into_iter()
        .map(|path| path.strip_prefix(root).unwrap_or(&path).to_path_buf())
        .collect();
    files.sort();
    files
}

fn collect_sources(dir: &Path, excluded_dirs: &BTreeSet<String>, out: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), "Cannot list directory: {e}");
            return;
        }
    };

    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let path = entry.path();
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        let name: &str = &file_name;

        if file_type.is_dir() {
            if excluded_dirs.contains(name) || ALWAYS_SKIPPED.contains(&name) {
                tracing::debug!(dir = %path.display(), "Skipping excluded directory");
                continue;
            }
            collect_sources(&path, excluded_dirs, out);
        } else if file_type.is_file()
            && path.extension().is_some_and(|ext| ext == SOURCE_EXTENSION)
        {
            out.push(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessError;
    use crate::services::process::{ProcessOutput, ShellRunner};
    use async_trait::async_trait;
    use std::fs;
    use std::sync::Mutex;

    fn default_excluded() -> BTreeSet<String> {
        BTreeSet::from(["test".to_string()])
    }

    fn write(root: &Path, rel: &str, contents: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn python_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn python(excluded: BTreeSet<String>) -> SyntaxValidator {
        SyntaxValidator::new(
            Arc::new(ShellRunner),
            "python3",
            excluded,
            Duration::from_secs(30),
        )
    }

    /// Answers every batch with a canned stdout and records the file arguments.
    struct CannedChecker {
        stdout: String,
        exit_code: Option<i32>,
        batches: Mutex<Vec<Vec<String>>>,
    }

    impl CannedChecker {
        fn new(stdout: &str, exit_code: Option<i32>) -> Arc<Self> {
            Arc::new(Self {
                stdout: stdout.to_string(),
                exit_code,
                batches: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CommandRunner for CannedChecker {
        async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput, ProcessError> {
            assert_eq!(&spec.args[..2], ["-I", "-c"]);
            self.batches.lock().unwrap().push(spec.args[3..].to_vec());
            Ok(ProcessOutput {
                exit_code: self.exit_code,
                stdout: self.stdout.clone(),
                stderr: "Traceback: boom".to_string(),
                ..Default::default()
            })
        }
    }

    fn canned(checker: Arc<CannedChecker>) -> SyntaxValidator {
        SyntaxValidator::new(checker, "python3", default_excluded(), Duration::from_secs(5))
    }

    #[test]
    fn walk_skips_excluded_git_and_non_source() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "test/invalid_files/bad.py", b"def f(:\n");
        write(dir.path(), "src/test/bad.py", b"class\n");
        write(dir.path(), ".git/hooks/x.py", b"def broken(\n");
        write(dir.path(), "README.md", b"def broken(\n");
        write(dir.path(), "pkg/b.py", b"x = 1\n");
        write(dir.path(), "a.py", b"x = 1\n");

        let files = source_files(dir.path(), &default_excluded());
        assert_eq!(files, vec![PathBuf::from("a.py"), PathBuf::from("pkg/b.py")]);
    }

    #[test]
    fn custom_exclusions_replace_default() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "test/bad.py", b"def f(:\n");
        write(dir.path(), "fixtures/bad.py", b"def f(:\n");

        let excluded = BTreeSet::from(["fixtures".to_string()]);
        let files = source_files(dir.path(), &excluded);
        assert_eq!(files, vec![PathBuf::from("test/bad.py")]);
    }

    #[tokio::test]
    async fn checker_failures_are_merged_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", b"");
        write(dir.path(), "b.py", b"");
        write(dir.path(), "c.py", b"");
        let checker = CannedChecker::new(
            r#"{"checked": 3, "failures": [{"path": "c.py", "error": "SyntaxError: x"}, {"path": "a.py", "error": "SyntaxError: y"}]}"#,
            Some(0),
        );

        let result = canned(checker.clone()).validate(dir.path()).await.unwrap();
        assert_eq!(result.checked_files, 3);
        assert_eq!(result.error_count, 2);
        assert_eq!(
            result.failing_files,
            vec![PathBuf::from("a.py"), PathBuf::from("c.py")]
        );
        assert_eq!(checker.batches.lock().unwrap()[0], vec!["a.py", "b.py", "c.py"]);
    }

    #[tokio::test]
    async fn large_trees_are_checked_in_batches() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..(FILES_PER_BATCH + 5) {
            write(dir.path(), &format!("m{i:04}.py"), b"");
        }
        // Each batch reports its own size; the canned answer only fits the last one.
        let checker = CannedChecker::new(r#"{"checked": 5, "failures": []}"#, Some(0));

        let err = canned(checker.clone()).validate(dir.path()).await.unwrap_err();
        assert!(matches!(
            err,
            ValidationError::Incomplete { expected, checked: 5 } if expected == FILES_PER_BATCH
        ));
        assert_eq!(checker.batches.lock().unwrap()[0].len(), FILES_PER_BATCH);
    }

    #[tokio::test]
    async fn crashed_checker_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", b"x = 1\n");
        let checker = CannedChecker::new("", Some(1));

        let err = canned(checker).validate(dir.path()).await.unwrap_err();
        match err {
            ValidationError::Checker { exit_code, stderr, .. } => {
                assert_eq!(exit_code, Some(1));
                assert_eq!(stderr, "Traceback: boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn empty_tree_runs_no_checker() {
        let dir = tempfile::tempdir().unwrap();
        let checker = CannedChecker::new("", Some(1));

        let result = canned(checker.clone()).validate(dir.path()).await.unwrap();
        assert!(result.is_clean());
        assert_eq!(result.checked_files, 0);
        assert!(checker.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn valid_tree_has_no_errors() {
        if !python_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "hello_world.py", b"print(\"Hello, world!\")\n");
        write(
            dir.path(),
            "pkg/util.py",
            b"def add(a, b):\n    return a + b\n\nclass Box:\n    pass\n",
        );
        write(dir.path(), "pkg/__init__.py", b"");
        write(dir.path(), "pkg/latin1.py", b"# -*- coding: latin-1 -*-\ns = '\xe9t\xe9'\n");

        let result = python(default_excluded()).validate(dir.path()).await.unwrap();
        assert_eq!(result.error_count, 0, "{:?}", result.failing_files);
        assert_eq!(result.checked_files, 4);
    }

    #[tokio::test]
    async fn python2_and_other_python3_syntax_errors_fail() {
        if !python_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let broken: &[(&str, &[u8])] = &[
            ("missing_colon.py", b"def main()\n    print('hi')\n"),
            ("py2_print.py", b"print \"hello\"\n"),
            ("py2_exec.py", b"exec \"x = 1\"\n"),
            ("py2_except.py", b"try:\n    pass\nexcept Exception, e:\n    pass\n"),
            ("py2_octal.py", b"mode = 0777\n"),
            ("tab_mix.py", b"if True:\n        x = 1\n\ty = 2\n"),
            ("assign_true.py", b"True = 1\n"),
            ("undecodable.py", b"s = '\xe9t\xe9'\n"),
        ];
        for (name, contents) in broken {
            write(dir.path(), name, contents);
        }
        write(dir.path(), "ok.py", b"x = 1\n");

        let result = python(default_excluded()).validate(dir.path()).await.unwrap();
        let mut expected: Vec<PathBuf> = broken.iter().map(|(n, _)| PathBuf::from(n)).collect();
        expected.sort();
        assert_eq!(result.failing_files, expected);
        assert_eq!(result.error_count, broken.len());
        assert_eq!(result.checked_files, broken.len() + 1);
    }

    #[tokio::test]
    async fn source_is_never_executed() {
        if !python_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "side_effect.py",
            b"open('executed.marker', 'w').write('x')\n",
        );
        // A module named like the stdlib one the checker imports.
        write(dir.path(), "ast.py", b"open('shadowed.marker', 'w').write('x')\n");

        let result = python(default_excluded()).validate(dir.path()).await.unwrap();
        assert!(result.is_clean());
        assert!(!dir.path().join("executed.marker").exists());
        assert!(!dir.path().join("shadowed.marker").exists());
    }

    #[tokio::test]
    async fn missing_interpreter_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", b"x = 1\n");
        let validator = SyntaxValidator::new(
            Arc::new(ShellRunner),
            "definitely-not-python-7c1d",
            default_excluded(),
            Duration::from_secs(5),
        );

        let err = validator.validate(dir.path()).await.unwrap_err();
        assert!(matches!(err, ValidationError::Process(ProcessError::Spawn { .. })));
    }
}
