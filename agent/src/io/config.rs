//! Agent configuration loaded from `agent.toml` in the project root.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Agent configuration (TOML).
///
/// Every field is optional in the file; missing fields default to the values
/// the agent ships with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Attempt budget used when `--max-attempts` is not given.
    pub max_attempts_default: u32,

    /// Write prompt, completion, module and test log per attempt.
    pub record_attempts: bool,

    /// Rebind the generated `parse` so its result always passes through
    /// schema normalization.
    pub wrap_entrypoint: bool,

    pub generator: GeneratorConfig,
    pub tests: TestsConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Model id, with or without the `models/` prefix.
    pub model: String,
    /// API root; `/models/{model}:generateContent` is appended.
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub request_timeout_secs: u64,
    /// Skip TLS certificate verification. Only for broken corporate proxies.
    pub accept_invalid_certs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TestsConfig {
    /// Test command; the test file or directory is appended as the last argument.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    /// Truncate captured stdout/stderr beyond this many bytes each.
    pub output_limit_bytes: usize,
    /// Environment variable set to the project root for the test process.
    pub root_env: String,
}

/// Project-relative locations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub package_dir: String,
    pub tests_dir: String,
    pub data_dir: String,
    pub attempts_dir: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_attempts_default: 3,
            record_attempts: true,
            wrap_entrypoint: true,
            generator: GeneratorConfig::default(),
            tests: TestsConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model: "gemini-flash-latest".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            request_timeout_secs: 120,
            accept_invalid_certs: false,
        }
    }
}

impl Default for TestsConfig {
    fn default() -> Self {
        Self {
            command: vec!["pytest".to_string(), "-q".to_string()],
            timeout_secs: 10 * 60,
            output_limit_bytes: 1_000_000,
            root_env: "PYTHONPATH".to_string(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            package_dir: "custom_parsers".to_string(),
            tests_dir: "tests".to_string(),
            data_dir: "data".to_string(),
            attempts_dir: ".agent/attempts".to_string(),
        }
    }
}

impl GeneratorConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl TestsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts_default == 0 {
            return Err(anyhow!("max_attempts_default must be > 0"));
        }
        if self.generator.model.trim().is_empty() {
            return Err(anyhow!("generator.model must not be empty"));
        }
        if self.generator.base_url.trim().is_empty() {
            return Err(anyhow!("generator.base_url must not be empty"));
        }
        if self.generator.api_key_env.trim().is_empty() {
            return Err(anyhow!("generator.api_key_env must not be empty"));
        }
        if self.generator.request_timeout_secs == 0 {
            return Err(anyhow!("generator.request_timeout_secs must be > 0"));
        }
        if self.tests.command.is_empty() || self.tests.command[0].trim().is_empty() {
            return Err(anyhow!("tests.command must be a non-empty array"));
        }
        if self.tests.timeout_secs == 0 {
            return Err(anyhow!("tests.timeout_secs must be > 0"));
        }
        if self.tests.output_limit_bytes == 0 {
            return Err(anyhow!("tests.output_limit_bytes must be > 0"));
        }
        if self.tests.root_env.trim().is_empty() {
            return Err(anyhow!("tests.root_env must not be empty"));
        }
        for (name, value) in [
            ("paths.package_dir", &self.paths.package_dir),
            ("paths.tests_dir", &self.paths.tests_dir),
            ("paths.data_dir", &self.paths.data_dir),
            ("paths.attempts_dir", &self.paths.attempts_dir),
        ] {
            if value.trim().is_empty() {
                return Err(anyhow!("{name} must not be empty"));
            }
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        let cfg = AgentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}
