//! Test-only helpers: a scratch project and scripted loop collaborators.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::types::TestVerdict;
use crate::io::config::PathsConfig;
use crate::io::generator::CodeGenerator;
use crate::io::init::{AgentPaths, init_workspace};
use crate::io::test_runner::TestRunner;

/// Initialized project in a temporary directory.
pub struct TestProject {
    _temp: TempDir,
    pub paths: AgentPaths,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create tempdir")?;
        let paths = AgentPaths::new(temp.path(), &PathsConfig::default());
        init_workspace(&paths)?;
        Ok(Self { _temp: temp, paths })
    }

    pub fn read_module(&self, target: &str) -> Result<String> {
        let path = self.paths.module_path(target);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }
}

/// One scripted generator response.
#[derive(Debug, Clone)]
pub enum ScriptedCompletion {
    Text(String),
    Error(String),
}

impl ScriptedCompletion {
    pub fn text(text: impl Into<String>) -> Self {
        ScriptedCompletion::Text(text.into())
    }
}

/// Generator returning queued completions and recording every prompt.
pub struct ScriptedGenerator {
    completions: RefCell<VecDeque<ScriptedCompletion>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(completions: Vec<ScriptedCompletion>) -> Self {
        Self {
            completions: RefCell::new(completions.into()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    /// Same completion for `count` calls.
    pub fn repeat(text: &str, count: usize) -> Self {
        Self::new(vec![ScriptedCompletion::text(text); count])
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.borrow().len()
    }
}

impl CodeGenerator for ScriptedGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.borrow_mut().push(prompt.to_string());
        match self.completions.borrow_mut().pop_front() {
            Some(ScriptedCompletion::Text(text)) => Ok(text),
            Some(ScriptedCompletion::Error(msg)) => Err(anyhow!(msg)),
            None => Err(anyhow!("scripted generator exhausted")),
        }
    }
}

/// Test runner returning queued verdicts. Records the module source present
/// on disk at the moment each run starts.
pub struct ScriptedTestRunner {
    paths: AgentPaths,
    verdicts: RefCell<VecDeque<TestVerdict>>,
    seen_modules: RefCell<Vec<String>>,
}

impl ScriptedTestRunner {
    pub fn new(paths: &AgentPaths, verdicts: Vec<TestVerdict>) -> Self {
        Self {
            paths: paths.clone(),
            verdicts: RefCell::new(verdicts.into()),
            seen_modules: RefCell::new(Vec::new()),
        }
    }

    pub fn seen_modules(&self) -> Vec<String> {
        self.seen_modules.borrow().clone()
    }

    pub fn runs(&self) -> usize {
        self.seen_modules.borrow().len()
    }
}

impl TestRunner for ScriptedTestRunner {
    fn run(&self, target: &str) -> TestVerdict {
        let module = fs::read_to_string(self.paths.module_path(target)).unwrap_or_default();
        self.seen_modules.borrow_mut().push(module);
        self.verdicts
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| TestVerdict::failed("scripted test runner exhausted"))
    }
}
