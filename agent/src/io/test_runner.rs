//! Test oracle adapter: runs the target's pytest suite in a child process.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::core::types::TestVerdict;
use crate::io::config::TestsConfig;
use crate::io::init::AgentPaths;
use crate::io::process::run_command_with_timeout;

/// Runs the tests for a target and classifies the result.
///
/// Implementations never fail: problems running the tests are reported as a
/// failing verdict with the reason in its output.
pub trait TestRunner {
    fn run(&self, target: &str) -> TestVerdict;
}

/// Runs the configured test command (`pytest -q` by default) from the project root.
#[derive(Debug, Clone)]
pub struct PytestRunner {
    paths: AgentPaths,
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
    root_env: String,
}

impl PytestRunner {
    pub fn new(paths: &AgentPaths, config: &TestsConfig) -> Self {
        Self {
            paths: paths.clone(),
            command: config.command.clone(),
            timeout: config.timeout(),
            output_limit_bytes: config.output_limit_bytes,
            root_env: config.root_env.clone(),
        }
    }

    /// The target's own test file if present, otherwise the whole tests directory.
    pub fn selection(&self, target: &str) -> PathBuf {
        let test_path = self.paths.test_path(target);
        if test_path.is_file() {
            test_path
        } else {
            self.paths.tests_dir.clone()
        }
    }

    fn build_command(&self, target: &str) -> Option<Command> {
        let (program, args) = self.command.split_first()?;
        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg(self.selection(target))
            .current_dir(&self.paths.root)
            .env(&self.root_env, &self.paths.root);
        Some(cmd)
    }
}

impl TestRunner for PytestRunner {
    #[instrument(skip_all, fields(parser = %target, timeout_secs = self.timeout.as_secs()))]
    fn run(&self, target: &str) -> TestVerdict {
        info!(selection = %self.selection(target).display(), "running tests");
        let Some(cmd) = self.build_command(target) else {
            return TestVerdict::failed("test command is empty\n");
        };
        let output = match run_command_with_timeout(cmd, self.timeout, self.output_limit_bytes) {
            Ok(output) => output,
            Err(err) => {
                warn!(err = %err, "test command could not be run");
                return TestVerdict::failed(format!(
                    "failed to run test command {:?}: {err:#}\n",
                    self.command
                ));
            }
        };

        let mut text = output.combined();
        if output.timed_out {
            text.push_str(&format!(
                "\n[test run timed out after {}s and was killed]\n",
                self.timeout.as_secs()
            ));
            return TestVerdict::timed_out(text);
        }
        if output.status.success() {
            TestVerdict::passed(text)
        } else {
            TestVerdict::failed(text)
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::fs;

    use super::*;
    use crate::core::types::VerdictStatus;
    use crate::io::config::PathsConfig;

    fn runner(root: &std::path::Path, script: &str, timeout_secs: u64) -> PytestRunner {
        let paths = AgentPaths::new(root, &PathsConfig::default());
        fs::create_dir_all(&paths.tests_dir).expect("tests dir");
        PytestRunner::new(
            &paths,
            &TestsConfig {
                command: vec![
                    "sh".to_string(),
                    "-c".to_string(),
                    script.to_string(),
                    "sh".to_string(),
                ],
                timeout_secs,
                output_limit_bytes: 10_000,
                root_env: "PARSER_AGENT_TEST_ROOT".to_string(),
            },
        )
    }

    #[test]
    fn runs_whole_directory_when_target_file_missing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = runner(temp.path(), "echo \"arg=$1\"", 10);

        let verdict = runner.run("icici");

        assert_eq!(verdict.status, VerdictStatus::Passed);
        assert!(verdict.output.trim_end().ends_with("/tests"));
    }

    #[test]
    fn runs_only_target_file_when_present() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = runner(temp.path(), "echo \"arg=$1\"", 10);
        fs::write(temp.path().join("tests/test_icici.py"), "").expect("write test");

        let verdict = runner.run("icici");

        assert!(verdict.success());
        assert!(verdict.output.trim_end().ends_with("tests/test_icici.py"));
    }

    #[test]
    fn exposes_project_root_and_combines_streams() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = runner(
            temp.path(),
            "echo \"root=$PARSER_AGENT_TEST_ROOT\"; echo boom 1>&2; exit 1",
            10,
        );

        let verdict = runner.run("icici");

        assert_eq!(verdict.status, VerdictStatus::Failed);
        let expected = format!("root={}\nboom\n", temp.path().display());
        assert_eq!(verdict.output, expected);
    }

    #[test]
    fn timeout_yields_distinct_verdict() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = runner(temp.path(), "exec sleep 5", 1);

        let verdict = runner.run("icici");

        assert_eq!(verdict.status, VerdictStatus::TimedOut);
        assert!(!verdict.success());
        assert!(verdict.output.contains("timed out after 1s"));
    }

    #[test]
    fn missing_test_binary_is_a_failed_verdict() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = AgentPaths::new(temp.path(), &PathsConfig::default());
        let runner = PytestRunner::new(
            &paths,
            &TestsConfig {
                command: vec!["definitely-not-a-real-binary-xyz".to_string()],
                ..TestsConfig::default()
            },
        );

        let verdict = runner.run("icici");

        assert_eq!(verdict.status, VerdictStatus::Failed);
        assert!(verdict.output.contains("failed to run test command"));
    }
}
