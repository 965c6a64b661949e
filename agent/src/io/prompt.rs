//! Prompt rendering for parser generation.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::core::types::{CANONICAL_COLUMNS, HEADER_SYNONYMS};
use crate::io::init::AgentPaths;

const PARSER_TEMPLATE: &str = include_str!("prompts/parser.md");

/// One header-normalization rule as shown to the model.
#[derive(Debug, Clone, Serialize)]
struct SynonymRule {
    canonical: &'static str,
    sources: String,
}

/// Renders the generation prompt for a target and attempt.
pub struct PromptBuilder {
    env: Environment<'static>,
    package_dir: String,
}

impl PromptBuilder {
    pub fn new(paths: &AgentPaths) -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("parser", PARSER_TEMPLATE)
            .context("load parser prompt template")?;
        let package_dir = paths
            .package_dir
            .strip_prefix(&paths.root)
            .unwrap_or(&paths.package_dir)
            .display()
            .to_string();
        Ok(Self { env, package_dir })
    }

    /// Render the prompt. `log` is the previous attempt's test output (empty on
    /// the first attempt) and is embedded verbatim.
    pub fn build(&self, target: &str, attempt: u32, log: &str) -> Result<String> {
        let module_path = format!("{}/{target}_parser.py", self.package_dir);
        let synonyms: Vec<SynonymRule> = HEADER_SYNONYMS
            .iter()
            .map(|(canonical, sources)| SynonymRule {
                canonical: *canonical,
                sources: quote_list(sources),
            })
            .collect();

        let template = self.env.get_template("parser")?;
        let rendered = template
            .render(context! {
                module_path => module_path,
                columns => quote_list(&CANONICAL_COLUMNS),
                synonyms => synonyms,
                attempt => attempt,
                log => log,
            })
            .context("render parser prompt")?;
        debug!(parser = %target, attempt, bytes = rendered.len(), "prompt rendered");
        Ok(rendered)
    }
}

fn quote_list(items: &[&str]) -> String {
    items
        .iter()
        .map(|item| format!("'{item}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::io::config::PathsConfig;

    fn builder() -> PromptBuilder {
        PromptBuilder::new(&AgentPaths::new(
            Path::new("/project"),
            &PathsConfig::default(),
        ))
        .expect("builder")
    }

    #[test]
    fn prompt_states_output_contract() {
        let prompt = builder().build("icici", 1, "").expect("render");

        assert!(prompt.starts_with("Write valid Python code for custom_parsers/icici_parser.py."));
        assert!(prompt.contains("def parse(pdf_path: str) -> pandas.DataFrame"));
        assert!(prompt.contains(
            "exactly the columns ['Date', 'Description', 'Debit Amt', 'Credit Amt', 'Balance']"
        ));
        assert!(prompt.contains(
            "return pd.DataFrame(columns=['Date', 'Description', 'Debit Amt', 'Credit Amt', 'Balance'])"
        ));
        assert!(prompt.contains("DD-MM-YYYY"));
        assert!(prompt.contains("Output ONLY valid Python code"));
    }

    #[test]
    fn prompt_lists_header_synonyms_one_per_line() {
        let prompt = builder().build("icici", 1, "").expect("render");

        assert!(prompt.contains(
            "- Normalize headers by mapping:\n    * 'Debit Amt', 'Withdrawal Amt' -> 'Debit Amt'\n    * 'Credit Amt', 'Deposit Amt' -> 'Credit Amt'\n"
        ));
        assert!(prompt.contains(
            "    * 'Date', 'Txn Date', 'Transaction Date' -> 'Date'\n- Keep Debit Amt/Credit Amt"
        ));
        assert!(prompt.contains("'Description', 'Narration', 'Particulars' -> 'Description'"));
        assert!(prompt.contains("'Balance', 'Closing Balance' -> 'Balance'"));
    }

    #[test]
    fn prompt_carries_attempt_and_verbatim_log() {
        let log = "E   AssertionError: {{ not a template }}\nFAILED tests/test_icici.py";
        let prompt = builder().build("icici", 2, log).expect("render");

        assert!(prompt.ends_with(&format!("Attempt 2. Previous errors:\n{log}")));
    }

    #[test]
    fn first_attempt_has_empty_error_section() {
        let prompt = builder().build("sbi", 1, "").expect("render");
        assert!(prompt.contains("custom_parsers/sbi_parser.py"));
        assert!(prompt.trim_end().ends_with("Attempt 1. Previous errors:"));
    }
}
