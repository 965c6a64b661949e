//! I/O adapters for the agent loop.

pub mod attempt_log;
pub mod config;
pub mod generator;
pub mod init;
pub mod process;
pub mod prompt;
pub mod test_runner;
