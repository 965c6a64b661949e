//! Per-attempt artifacts under `.agent/attempts/<target>/<attempt>/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::types::VerdictStatus;

#[derive(Debug, Clone, Serialize)]
pub struct AttemptMeta {
    pub target: String,
    pub attempt: u32,
    pub max_attempts: u32,
    pub verdict: VerdictStatus,
    pub module_path: String,
    pub patched_return_line: Option<usize>,
    pub patched_return_variable: Option<String>,
    pub wrapped_entrypoint: bool,
    pub started_at: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct AttemptPaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub prompt_path: PathBuf,
    pub completion_path: PathBuf,
    pub module_path: PathBuf,
    pub test_log_path: PathBuf,
}

impl AttemptPaths {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            meta_path: dir.join("meta.json"),
            prompt_path: dir.join("prompt.md"),
            completion_path: dir.join("completion.txt"),
            module_path: dir.join("module.py"),
            test_log_path: dir.join("test.log"),
            dir,
        }
    }
}

pub struct AttemptWriteRequest<'a> {
    pub dir: PathBuf,
    pub meta: &'a AttemptMeta,
    pub prompt: &'a str,
    pub completion: &'a str,
    pub module: &'a str,
    pub test_log: &'a str,
}

pub fn write_attempt(request: &AttemptWriteRequest<'_>) -> Result<AttemptPaths> {
    let paths = AttemptPaths::new(request.dir.clone());
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create attempt dir {}", paths.dir.display()))?;

    write_json(&paths.meta_path, request.meta)?;
    write_text(&paths.prompt_path, request.prompt)?;
    write_text(&paths.completion_path, request.completion)?;
    write_text(&paths.module_path, request.module)?;
    write_text(&paths.test_log_path, request.test_log)?;

    Ok(paths)
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_text(path, &buf)
}
