//! Executes schema-enforced modules under Python.
//!
//! Excluded from regular runs: needs `python3` with pandas on `PATH`.
//!
//! Run with: `cargo test -p parser-agent --test schema_python -- --ignored`

use std::fs;
use std::path::Path;
use std::process::Command;

use parser_agent::core::schema::{EnforceOptions, enforce_schema};
use parser_agent::core::types::CANONICAL_COLUMNS;
use serde_json::{Value, json};

const CALL_PARSE: &str = r#"
import json, math, sys
sys.path.insert(0, sys.argv[1])
from generated import parse
df = parse(*json.loads(sys.argv[2]), **json.loads(sys.argv[3]))
rows = [[None if isinstance(v, float) and math.isnan(v) else v for v in row] for row in df.values.tolist()]
print(json.dumps({"columns": list(df.columns), "rows": rows}))
"#;

/// Writes `source` as `generated.py` and returns what `parse(*args, **kwargs)` produced.
fn call_parse(dir: &Path, source: &str, args: Value, kwargs: Value) -> Value {
    fs::write(dir.join("generated.py"), source).expect("write module");
    let output = Command::new("python3")
        .arg("-c")
        .arg(CALL_PARSE)
        .arg(dir)
        .arg(args.to_string())
        .arg(kwargs.to_string())
        .output()
        .expect("spawn python3");
    assert!(
        output.status.success(),
        "python failed:\n{}\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("parse python output")
}

fn canonical_columns() -> Value {
    json!(CANONICAL_COLUMNS)
}

#[test]
#[ignore]
fn patched_return_fills_and_orders_columns() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = "import pandas as pd\n\n\ndef parse(pdf_path):\n    df = pd.DataFrame({\"Balance\": [1.0], \"Date\": [\"01-01-2024\"]})\n    return df\n";
    let enforced = enforce_schema(
        source,
        EnforceOptions {
            wrap_entrypoint: false,
        },
    );
    assert!(enforced.patched_return.is_some());
    assert!(!enforced.wrapped_entrypoint);

    let frame = call_parse(dir.path(), &enforced.source, json!(["statement.pdf"]), json!({}));

    assert_eq!(frame["columns"], canonical_columns());
    assert_eq!(frame["rows"], json!([["01-01-2024", "", 0.0, 0.0, 1.0]]));
}

#[test]
#[ignore]
fn wrapper_normalizes_returns_the_patch_cannot_match() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = "import pandas as pd\n\n\ndef parse(pdf_path):\n    df = pd.DataFrame({\"Credit Amt\": [5.0], \"Description\": [\"x\"]})\n    return df.reset_index(drop=True)\n";
    let enforced = enforce_schema(source, EnforceOptions::default());
    assert!(enforced.patched_return.is_none());
    assert!(enforced.wrapped_entrypoint);

    let frame = call_parse(dir.path(), &enforced.source, json!(["statement.pdf"]), json!({}));

    assert_eq!(frame["columns"], canonical_columns());
    assert_eq!(frame["rows"], json!([["", "x", 0.0, 5.0, null]]));
}

#[test]
#[ignore]
fn wrapper_forwards_keyword_arguments() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = "import pandas as pd\n\n\ndef parse(pdf_path, password=None):\n    df = pd.DataFrame({\"Description\": [password]})\n    return df\n";
    let enforced = enforce_schema(source, EnforceOptions::default());
    assert!(enforced.patched_return.is_some());
    assert!(enforced.wrapped_entrypoint);

    let frame = call_parse(
        dir.path(),
        &enforced.source,
        json!(["statement.pdf"]),
        json!({"password": "secret"}),
    );

    assert_eq!(frame["columns"], canonical_columns());
    assert_eq!(frame["rows"], json!([["", "secret", 0.0, 0.0, null]]));
}

#[test]
#[ignore]
fn wrapper_turns_none_into_empty_canonical_frame() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = "def parse(pdf_path):\n    return None\n";
    let enforced = enforce_schema(source, EnforceOptions::default());
    assert!(enforced.wrapped_entrypoint);

    let frame = call_parse(dir.path(), &enforced.source, json!(["statement.pdf"]), json!({}));

    assert_eq!(frame["columns"], canonical_columns());
    assert_eq!(frame["rows"], json!([]));
}
