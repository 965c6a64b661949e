//! Project scaffolding: the generated-parser package and test bootstrap.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::io::config::PathsConfig;

/// Resolved project locations.
#[derive(Debug, Clone)]
pub struct AgentPaths {
    pub root: PathBuf,
    pub package_dir: PathBuf,
    pub package_marker_path: PathBuf,
    pub tests_dir: PathBuf,
    pub conftest_path: PathBuf,
    pub data_dir: PathBuf,
    pub attempts_dir: PathBuf,
}

impl AgentPaths {
    pub fn new(root: impl Into<PathBuf>, config: &PathsConfig) -> Self {
        let root = root.into();
        let package_dir = root.join(&config.package_dir);
        let tests_dir = root.join(&config.tests_dir);
        Self {
            package_marker_path: package_dir.join("__init__.py"),
            conftest_path: tests_dir.join("conftest.py"),
            data_dir: root.join(&config.data_dir),
            attempts_dir: root.join(&config.attempts_dir),
            package_dir,
            tests_dir,
            root,
        }
    }

    /// Generated module for `target`, e.g. `custom_parsers/icici_parser.py`.
    pub fn module_path(&self, target: &str) -> PathBuf {
        self.package_dir.join(format!("{target}_parser.py"))
    }

    /// Target-specific test file, e.g. `tests/test_icici.py`.
    pub fn test_path(&self, target: &str) -> PathBuf {
        self.tests_dir.join(format!("test_{target}.py"))
    }

    /// Sample statement used by the reference test.
    pub fn sample_pdf_path(&self, target: &str) -> PathBuf {
        self.data_dir
            .join(target)
            .join(format!("{target}_sample.pdf"))
    }

    /// Expected table for the sample statement.
    pub fn expected_csv_path(&self, target: &str) -> PathBuf {
        self.data_dir.join(target).join("result.csv")
    }

    /// Artifact directory for one attempt.
    pub fn attempt_dir(&self, target: &str, attempt: u32) -> PathBuf {
        self.attempts_dir.join(target).join(attempt.to_string())
    }
}

/// Ensure the parser package and the tests bootstrap exist.
///
/// Idempotent: existing files are never overwritten, so a customized
/// `conftest.py` or `__init__.py` survives repeated runs.
pub fn init_workspace(paths: &AgentPaths) -> Result<()> {
    create_dir(&paths.package_dir)?;
    write_if_missing(&paths.package_marker_path, PACKAGE_MARKER)?;
    create_dir(&paths.tests_dir)?;
    write_if_missing(&paths.conftest_path, CONFTEST)?;
    Ok(())
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

fn write_if_missing(path: &Path, contents: &str) -> Result<()> {
    if path.exists() {
        debug!(path = %path.display(), "keeping existing file");
        return Ok(());
    }
    fs::write(path, contents).with_context(|| format!("write file {}", path.display()))
}

const PACKAGE_MARKER: &str = "";
const CONFTEST: &str = "import sys, pathlib; sys.path.insert(0, str(pathlib.Path(__file__).resolve().parents[1]))\n";
