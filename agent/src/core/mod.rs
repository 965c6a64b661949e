//! Pure, deterministic logic for the generate-test-repair loop.
//!
//! Nothing in this module touches the filesystem, the network, or child
//! processes.

pub mod sanitize;
pub mod schema;
pub mod types;
