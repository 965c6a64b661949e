//! Strip markdown fencing from a raw model completion.

/// Drop every line whose trimmed content starts with a code fence marker, then
/// trim surrounding whitespace. Line order is preserved.
pub fn sanitize_completion(raw: &str) -> String {
    raw.lines()
        .filter(|line| !line.trim().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences_and_keeps_code() {
        let raw = "```python\nimport pandas as pd\n\ndef parse(p):\n    return pd.DataFrame()\n```\n";
        assert_eq!(
            sanitize_completion(raw),
            "import pandas as pd\n\ndef parse(p):\n    return pd.DataFrame()"
        );
    }

    #[test]
    fn strips_indented_fences() {
        let raw = "  ```py\nx = 1\n   ```";
        assert_eq!(sanitize_completion(raw), "x = 1");
    }

    #[test]
    fn keeps_backticks_that_do_not_start_a_line() {
        let raw = "s = \"```\"\nprint(s)";
        assert_eq!(sanitize_completion(raw), raw);
    }

    #[test]
    fn sanitizing_clean_code_is_idempotent() {
        let clean = "import pandas as pd\n\n\ndef parse(path):\n    return None";
        let once = sanitize_completion(&format!("\n\n{clean}\n  \n"));
        assert_eq!(once, clean);
        assert_eq!(sanitize_completion(&once), once);
    }
}
