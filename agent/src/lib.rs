//! Self-correcting parser generation loop.
//!
//! Given a target (e.g. a bank name), the agent asks a language model for a
//! Python module that parses that target's PDF statements into a five-column
//! table, runs the target's pytest suite against it, and on failure retries
//! with the captured test log appended to the prompt.
//!
//! - **[`core`]**: Pure logic (attempt state, sanitizing completions, schema
//!   enforcement). No I/O.
//! - **[`io`]**: Side-effecting adapters (filesystem scaffolding, prompt
//!   rendering, the model client, the test subprocess, attempt artifacts).
//!
//! [`looping`] coordinates the two to implement the generate-test-repair loop.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
