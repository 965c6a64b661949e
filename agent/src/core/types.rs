//! Shared types for the retry loop: attempt state, test verdicts and the
//! fixed output schema every generated parser must honor.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Canonical output columns, in order.
pub const CANONICAL_COLUMNS: [&str; 5] = ["Date", "Description", "Debit Amt", "Credit Amt", "Balance"];

/// Source header spellings folded into each canonical column.
pub const HEADER_SYNONYMS: [(&str, &[&str]); 5] = [
    ("Debit Amt", &["Debit Amt", "Withdrawal Amt"]),
    ("Credit Amt", &["Credit Amt", "Deposit Amt"]),
    ("Balance", &["Balance", "Closing Balance"]),
    ("Description", &["Description", "Narration", "Particulars"]),
    ("Date", &["Date", "Txn Date", "Transaction Date"]),
];

/// Value used to fill a canonical column the generated code did not produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnFill {
    /// Textual columns: empty string.
    EmptyText,
    /// Amount columns: `0.0`.
    Zero,
    /// Balance: missing-value marker.
    Missing,
}

impl ColumnFill {
    pub fn for_column(column: &str) -> Self {
        match column {
            "Date" | "Description" => ColumnFill::EmptyText,
            "Debit Amt" | "Credit Amt" => ColumnFill::Zero,
            _ => ColumnFill::Missing,
        }
    }

    /// Python expression producing the fill value.
    pub fn python_literal(self) -> &'static str {
        match self {
            ColumnFill::EmptyText => "\"\"",
            ColumnFill::Zero => "0.0",
            ColumnFill::Missing => "float(\"nan\")",
        }
    }
}

/// Mutable state of one agent run.
///
/// Only the retry controller mutates it, once per failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptState {
    pub target: String,
    pub attempt: u32,
    pub max_attempts: u32,
    pub log: String,
    pub verbose: bool,
}

impl AttemptState {
    /// Build the initial state (attempt 1, empty log). The target is lowercased.
    pub fn new(target: &str, max_attempts: u32, verbose: bool) -> Result<Self> {
        let target = normalize_target(target)?;
        if max_attempts == 0 {
            bail!("max attempts must be >= 1");
        }
        Ok(Self {
            target,
            attempt: 1,
            max_attempts,
            log: String::new(),
            verbose,
        })
    }

    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Move to the next attempt, carrying the failing test output forward.
    ///
    /// Returns `false` (and leaves the state untouched) when the budget is spent.
    pub fn advance(&mut self, log: String) -> bool {
        if self.is_last_attempt() {
            return false;
        }
        self.attempt += 1;
        self.log = log;
        true
    }
}

/// Lowercase and validate a target identifier.
///
/// The target becomes part of a Python module name, so only ASCII letters,
/// digits and `_` are accepted.
pub fn normalize_target(raw: &str) -> Result<String> {
    let target = raw.trim().to_ascii_lowercase();
    if target.is_empty() {
        bail!("target must not be empty");
    }
    if let Some(bad) = target
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
    {
        bail!("target {target:?} contains invalid character {bad:?} (allowed: a-z, 0-9, _)");
    }
    Ok(target)
}

/// Classification of one test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictStatus {
    Passed,
    Failed,
    /// The test process exceeded its time budget and was killed.
    TimedOut,
}

impl VerdictStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VerdictStatus::Passed => "passed",
            VerdictStatus::Failed => "failed",
            VerdictStatus::TimedOut => "timed_out",
        }
    }
}

/// Outcome of running the test oracle once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestVerdict {
    pub status: VerdictStatus,
    /// Captured stdout followed by stderr.
    pub output: String,
}

impl TestVerdict {
    pub fn passed(output: impl Into<String>) -> Self {
        Self {
            status: VerdictStatus::Passed,
            output: output.into(),
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            status: VerdictStatus::Failed,
            output: output.into(),
        }
    }

    pub fn timed_out(output: impl Into<String>) -> Self {
        Self {
            status: VerdictStatus::TimedOut,
            output: output.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == VerdictStatus::Passed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_lowercases_target_and_starts_at_one() {
        let state = AttemptState::new("ICICI", 3, false).expect("state");
        assert_eq!(state.target, "icici");
        assert_eq!(state.attempt, 1);
        assert_eq!(state.max_attempts, 3);
        assert!(state.log.is_empty());
    }

    #[test]
    fn new_state_rejects_zero_budget() {
        let err = AttemptState::new("icici", 0, false).unwrap_err();
        assert!(err.to_string().contains("max attempts"));
    }

    #[test]
    fn normalize_target_rejects_path_characters() {
        assert!(normalize_target("../etc").is_err());
        assert!(normalize_target("hdfc-bank").is_err());
        assert!(normalize_target("   ").is_err());
        assert_eq!(normalize_target(" Sbi_2 ").expect("valid"), "sbi_2");
    }

    #[test]
    fn advance_increments_and_replaces_log_until_budget_spent() {
        let mut state = AttemptState::new("icici", 2, false).expect("state");

        assert!(state.advance("first failure".to_string()));
        assert_eq!(state.attempt, 2);
        assert_eq!(state.log, "first failure");

        assert!(!state.advance("second failure".to_string()));
        assert_eq!(state.attempt, 2);
        assert_eq!(state.log, "first failure");
    }

    #[test]
    fn column_fill_matches_column_kind() {
        assert_eq!(ColumnFill::for_column("Date"), ColumnFill::EmptyText);
        assert_eq!(ColumnFill::for_column("Description"), ColumnFill::EmptyText);
        assert_eq!(ColumnFill::for_column("Debit Amt"), ColumnFill::Zero);
        assert_eq!(ColumnFill::for_column("Credit Amt"), ColumnFill::Zero);
        assert_eq!(ColumnFill::for_column("Balance"), ColumnFill::Missing);
    }

    #[test]
    fn every_canonical_column_has_synonyms() {
        for column in CANONICAL_COLUMNS {
            let rule = HEADER_SYNONYMS
                .iter()
                .find(|(canonical, _)| *canonical == column)
                .expect("synonym rule");
            assert!(rule.1.contains(&column));
        }
    }
}
