//! Schema enforcement for generated parser modules.
//!
//! Two independent rewrites guarantee the five canonical columns:
//!
//! - [`patch_first_return`] replaces the first `return df...` statement with a
//!   block that fills in missing columns and reorders them. Only the first
//!   matching statement is touched; code whose result variable does not look
//!   like `df*` is left as is.
//! - [`wrap_entrypoint`] rebinds the module's top-level `parse` so every call
//!   result passes through the same normalization, regardless of how the
//!   generated function returns.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::core::types::{CANONICAL_COLUMNS, ColumnFill};

static RETURN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^([ \t]*)return[ \t]+(df\w*)[ \t]*(?:#.*)?$").unwrap()
});

static PARSE_DEF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^def[ \t]+parse[ \t]*\(").unwrap());

const WRAPPER_MARKER: &str = "# --- Schema enforcement wrapper ---";

/// Location of the return statement that was rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchedReturn {
    /// 1-based line number of the replaced statement in the input source.
    pub line: usize,
    /// Name of the returned result variable.
    pub variable: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnforceOptions {
    /// Append the `parse` wrapper in addition to patching the return statement.
    pub wrap_entrypoint: bool,
}

impl Default for EnforceOptions {
    fn default() -> Self {
        Self {
            wrap_entrypoint: true,
        }
    }
}

/// Result of [`enforce_schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enforcement {
    pub source: String,
    pub patched_return: Option<PatchedReturn>,
    pub wrapped_entrypoint: bool,
}

/// Apply every enabled enforcement step to sanitized module source.
pub fn enforce_schema(source: &str, options: EnforceOptions) -> Enforcement {
    let (patched, patched_return) = patch_first_return(source);
    if patched_return.is_none() {
        warn!("no `return df...` statement found; return-statement patch skipped");
    }

    let (source, wrapped_entrypoint) = if options.wrap_entrypoint {
        let wrapped = wrap_entrypoint(&patched);
        if wrapped.is_none() {
            warn!("no top-level `def parse(` found; entry point left unwrapped");
        }
        match wrapped {
            Some(source) => (source, true),
            None => (patched, false),
        }
    } else {
        (patched, false)
    };

    debug!(
        patched = patched_return.is_some(),
        wrapped_entrypoint, "schema enforcement applied"
    );
    Enforcement {
        source,
        patched_return,
        wrapped_entrypoint,
    }
}

/// Replace the first `return <df identifier>` statement with the enforcement
/// block, keeping its indentation.
///
/// Returns the source unchanged and `None` when nothing matches.
pub fn patch_first_return(source: &str) -> (String, Option<PatchedReturn>) {
    let Some(caps) = RETURN_RE.captures(source) else {
        return (source.to_string(), None);
    };
    let (Some(whole), Some(indent), Some(variable)) = (caps.get(0), caps.get(1), caps.get(2))
    else {
        return (source.to_string(), None);
    };

    let block = return_block(variable.as_str())
        .iter()
        .map(|line| format!("{}{line}", indent.as_str()))
        .collect::<Vec<_>>()
        .join("\n");

    let mut patched = String::with_capacity(source.len() + block.len());
    patched.push_str(&source[..whole.start()]);
    patched.push_str(&block);
    patched.push_str(&source[whole.end()..]);

    let line = source[..whole.start()].matches('\n').count() + 1;
    (
        patched,
        Some(PatchedReturn {
            line,
            variable: variable.as_str().to_string(),
        }),
    )
}

/// Append a wrapper that rebinds top-level `parse` to normalize its result.
///
/// Returns `None` if the module has no top-level `parse` or is already wrapped.
pub fn wrap_entrypoint(source: &str) -> Option<String> {
    if source.contains(WRAPPER_MARKER) || !PARSE_DEF_RE.is_match(source) {
        return None;
    }
    let mut wrapped = source.trim_end().to_string();
    wrapped.push_str("\n\n\n");
    wrapped.push_str(&wrapper_block());
    Some(wrapped)
}

fn python_columns() -> String {
    let quoted: Vec<String> = CANONICAL_COLUMNS
        .iter()
        .map(|column| format!("\"{column}\""))
        .collect();
    format!("[{}]", quoted.join(", "))
}

fn python_fill_map() -> String {
    let entries: Vec<String> = CANONICAL_COLUMNS
        .iter()
        .map(|column| {
            format!(
                "\"{column}\": {}",
                ColumnFill::for_column(column).python_literal()
            )
        })
        .collect();
    format!("{{{}}}", entries.join(", "))
}

fn return_block(variable: &str) -> Vec<String> {
    vec![
        "# --- Final Schema Enforcement ---".to_string(),
        format!("_schema_columns = {}", python_columns()),
        format!("_schema_fill = {}", python_fill_map()),
        "for _schema_column in _schema_columns:".to_string(),
        format!("    if _schema_column not in {variable}.columns:"),
        format!("        {variable}[_schema_column] = _schema_fill[_schema_column]"),
        format!("{variable} = {variable}[_schema_columns]"),
        format!("return {variable}"),
    ]
}

fn wrapper_block() -> String {
    format!(
        "{WRAPPER_MARKER}
import pandas as _schema_pd

_SCHEMA_COLUMNS = {columns}
_SCHEMA_FILL = {fill}


def _enforce_schema(frame):
    if frame is None:
        return _schema_pd.DataFrame(columns=_SCHEMA_COLUMNS)
    frame = frame.copy()
    for column in _SCHEMA_COLUMNS:
        if column not in frame.columns:
            frame[column] = _SCHEMA_FILL[column]
    return frame[_SCHEMA_COLUMNS]


_generated_parse = parse


def parse(*args, **kwargs):
    return _enforce_schema(_generated_parse(*args, **kwargs))
",
        columns = python_columns(),
        fill = python_fill_map(),
    )
}
