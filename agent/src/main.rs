//! Self-correcting parser generator.
//!
//! Asks a language model for `custom_parsers/<target>_parser.py`, runs the
//! target's tests against it, and retries with the failure log until the tests
//! pass or the attempt budget is spent.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::warn;

use parser_agent::core::types::{AttemptState, VerdictStatus};
use parser_agent::exit_codes;
use parser_agent::io::config::load_config;
use parser_agent::io::generator::GeminiGenerator;
use parser_agent::io::init::{AgentPaths, init_workspace};
use parser_agent::io::test_runner::PytestRunner;
use parser_agent::logging;
use parser_agent::looping::{LoopEvent, LoopOptions, LoopStop, run_loop};

#[derive(Parser, Debug)]
#[command(
    name = "parser-agent",
    version,
    about = "Generate a bank statement parser and repair it until its tests pass"
)]
struct Cli {
    /// Target to generate a parser for (e.g. `icici`). Case-insensitive.
    #[arg(long)]
    target: String,

    /// Maximum number of attempts. Defaults to `max_attempts_default` from the config (3).
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    max_attempts: Option<u32>,

    /// Echo the captured test output after every attempt.
    #[arg(short, long)]
    verbose: bool,

    /// Project root holding the parser package, tests and data. Defaults to the current directory.
    #[arg(long)]
    root: Option<PathBuf>,

    /// Config file, relative to the project root unless absolute.
    #[arg(long, default_value = "agent.toml")]
    config: PathBuf,

    /// Disable TLS certificate verification for the generation API.
    #[arg(long)]
    accept_invalid_certs: bool,
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::FATAL);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir().context("resolve current directory")?,
    };
    let mut config = load_config(&root.join(&cli.config))?;
    if cli.accept_invalid_certs {
        config.generator.accept_invalid_certs = true;
    }

    let max_attempts = cli.max_attempts.unwrap_or(config.max_attempts_default);
    let mut state = AttemptState::new(&cli.target, max_attempts, cli.verbose)?;
    let generator = GeminiGenerator::from_env(&config.generator)?;

    let paths = AgentPaths::new(&root, &config.paths);
    init_workspace(&paths)?;
    warn_missing_fixtures(&paths, &state.target);
    let tests = PytestRunner::new(&paths, &config.tests);

    let outcome = run_loop(
        &paths,
        &mut state,
        &generator,
        &tests,
        &LoopOptions::from_config(&config),
        |event| print_event(&paths.root, event),
    )?;

    match outcome.stop {
        LoopStop::Succeeded => Ok(exit_codes::OK),
        LoopStop::Exhausted => {
            println!(
                "Giving up: no passing parser for {} after {} attempts.",
                outcome.target, outcome.attempts
            );
            Ok(exit_codes::EXHAUSTED)
        }
    }
}

fn warn_missing_fixtures(paths: &AgentPaths, target: &str) {
    let test_path = paths.test_path(target);
    if !test_path.is_file() {
        warn!(path = %test_path.display(), "no target test file; the whole tests directory will run");
    }
    for path in [paths.sample_pdf_path(target), paths.expected_csv_path(target)] {
        if !path.is_file() {
            warn!(path = %path.display(), "reference data missing");
        }
    }
}

fn print_event(root: &Path, event: &LoopEvent<'_>) {
    match event {
        LoopEvent::AttemptStarted { attempt, .. } => println!("\n--- Attempt {attempt} ---"),
        LoopEvent::ModuleWritten { path, .. } => {
            let shown = path.strip_prefix(root).unwrap_or(path);
            println!("[agent] wrote {}", shown.display());
        }
        LoopEvent::TestOutput { output, .. } => println!("{output}"),
        LoopEvent::Verdict {
            verdict,
            will_retry,
            ..
        } => {
            let label = match verdict.status {
                VerdictStatus::Passed => "Tests passed.",
                VerdictStatus::Failed if *will_retry => "Failed, retrying...",
                VerdictStatus::Failed => "Failed.",
                VerdictStatus::TimedOut if *will_retry => "Timed out, retrying...",
                VerdictStatus::TimedOut => "Timed out.",
            };
            println!("{label}");
        }
    }
}
