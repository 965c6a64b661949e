//! Generate-test-repair loop.
//!
//! Each attempt renders the prompt, asks the generator for code, sanitizes and
//! schema-enforces it, overwrites the target's module, and runs the tests. A
//! failing verdict feeds its output into the next attempt's prompt until the
//! attempt budget is spent.

use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use tracing::{info, instrument, warn};

use crate::core::sanitize::sanitize_completion;
use crate::core::schema::{EnforceOptions, enforce_schema};
use crate::core::types::{AttemptState, TestVerdict};
use crate::io::attempt_log::{AttemptMeta, AttemptWriteRequest, write_attempt};
use crate::io::config::AgentConfig;
use crate::io::generator::CodeGenerator;
use crate::io::init::AgentPaths;
use crate::io::prompt::PromptBuilder;
use crate::io::test_runner::TestRunner;

/// Knobs for [`run_loop`] that are fixed for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopOptions {
    pub enforce: EnforceOptions,
    pub record_attempts: bool,
}

impl LoopOptions {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            enforce: EnforceOptions {
                wrap_entrypoint: config.wrap_entrypoint,
            },
            record_attempts: config.record_attempts,
        }
    }
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default())
    }
}

/// Terminal state of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStop {
    /// A generated module passed its tests.
    Succeeded,
    /// Every attempt in the budget failed.
    Exhausted,
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub target: String,
    /// Number of attempts made (the attempt number of the last one).
    pub attempts: u32,
    pub stop: LoopStop,
    pub last_verdict: TestVerdict,
}

/// Progress notifications for console output.
#[derive(Debug)]
pub enum LoopEvent<'a> {
    AttemptStarted {
        attempt: u32,
        max_attempts: u32,
    },
    ModuleWritten {
        attempt: u32,
        path: &'a Path,
    },
    /// Full test output; only emitted when the state is verbose.
    TestOutput {
        attempt: u32,
        output: &'a str,
    },
    Verdict {
        attempt: u32,
        verdict: &'a TestVerdict,
        will_retry: bool,
    },
}

/// Run attempts until the tests pass or the budget in `state` is spent.
///
/// Generation errors and filesystem errors abort the loop immediately; failing
/// (or timed-out) tests are retried.
#[instrument(skip_all, fields(parser = %state.target, max_attempts = state.max_attempts))]
pub fn run_loop<G, T, F>(
    paths: &AgentPaths,
    state: &mut AttemptState,
    generator: &G,
    tests: &T,
    options: &LoopOptions,
    mut on_event: F,
) -> Result<LoopOutcome>
where
    G: CodeGenerator,
    T: TestRunner,
    F: FnMut(&LoopEvent<'_>),
{
    let prompts = PromptBuilder::new(paths)?;
    let module_path = paths.module_path(&state.target);

    loop {
        let attempt = state.attempt;
        let started_at = Utc::now();
        let start = Instant::now();
        info!(attempt, "starting attempt");
        on_event(&LoopEvent::AttemptStarted {
            attempt,
            max_attempts: state.max_attempts,
        });

        let prompt = prompts.build(&state.target, attempt, &state.log)?;
        let completion = generator
            .generate(&prompt)
            .with_context(|| format!("generate parser (attempt {attempt})"))?;
        let code = sanitize_completion(&completion);
        let enforcement = enforce_schema(&code, options.enforce);

        write_module(&module_path, &enforcement.source)?;
        on_event(&LoopEvent::ModuleWritten {
            attempt,
            path: &module_path,
        });

        let verdict = tests.run(&state.target);
        if state.verbose {
            on_event(&LoopEvent::TestOutput {
                attempt,
                output: &verdict.output,
            });
        }

        if options.record_attempts {
            let meta = AttemptMeta {
                target: state.target.clone(),
                attempt,
                max_attempts: state.max_attempts,
                verdict: verdict.status,
                module_path: module_path
                    .strip_prefix(&paths.root)
                    .unwrap_or(&module_path)
                    .display()
                    .to_string(),
                patched_return_line: enforcement.patched_return.as_ref().map(|p| p.line),
                patched_return_variable: enforcement
                    .patched_return
                    .as_ref()
                    .map(|p| p.variable.clone()),
                wrapped_entrypoint: enforcement.wrapped_entrypoint,
                started_at: started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                duration_ms: start.elapsed().as_millis() as u64,
            };
            write_attempt(&AttemptWriteRequest {
                dir: paths.attempt_dir(&state.target, attempt),
                meta: &meta,
                prompt: &prompt,
                completion: &completion,
                module: &enforcement.source,
                test_log: &verdict.output,
            })?;
        }

        let will_retry = !verdict.success() && !state.is_last_attempt();
        on_event(&LoopEvent::Verdict {
            attempt,
            verdict: &verdict,
            will_retry,
        });

        if verdict.success() {
            info!(attempt, "tests passed");
            return Ok(LoopOutcome {
                target: state.target.clone(),
                attempts: attempt,
                stop: LoopStop::Succeeded,
                last_verdict: verdict,
            });
        }

        warn!(attempt, status = verdict.status.as_str(), "tests did not pass");
        if !state.advance(verdict.output.clone()) {
            return Ok(LoopOutcome {
                target: state.target.clone(),
                attempts: attempt,
                stop: LoopStop::Exhausted,
                last_verdict: verdict,
            });
        }
    }
}

fn write_module(path: &Path, source: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create module dir {}", parent.display()))?;
    }
    fs::write(path, source).with_context(|| format!("write module {}", path.display()))
}
