//! Result rendering for the CLI: yaml, json, or toon.
//!
//! Toon is the compact token-oriented form: nested keys indented two
//! spaces, list items dashed, scalars inline. It exists to keep agent
//! transcripts small; yaml/json are for humans and machines respectively.

use cortex_core::OutputFormat;
use serde::Serialize;

pub fn render<T: Serialize>(value: &T, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("render error: {e}"))
        }
        OutputFormat::Yaml => {
            serde_yaml::to_string(value).unwrap_or_else(|e| format!("render error: {e}"))
        }
        OutputFormat::Toon => match serde_json::to_value(value) {
            Ok(v) => {
                let mut out = String::new();
                render_toon(&v, 0, &mut out);
                out
            }
            Err(e) => format!("render error: {e}"),
        },
    }
}

fn render_toon(value: &serde_json::Value, indent: usize, out: &mut String) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map {
                pad(indent, out);
                out.push_str(key);
                out.push(':');
                if is_scalar(val) {
                    out.push(' ');
                    push_scalar(val, out);
                    out.push('\n');
                } else {
                    out.push('\n');
                    render_toon(val, indent + 1, out);
                }
            }
        }
        serde_json::Value::Array(items) => {
            if items.is_empty() {
                pad(indent, out);
                out.push_str("(none)\n");
                return;
            }
            for item in items {
                pad(indent, out);
                out.push('-');
                if is_scalar(item) {
                    out.push(' ');
                    push_scalar(item, out);
                    out.push('\n');
                } else {
                    out.push('\n');
                    render_toon(item, indent + 1, out);
                }
            }
        }
        scalar => {
            pad(indent, out);
            push_scalar(scalar, out);
            out.push('\n');
        }
    }
}

fn is_scalar(value: &serde_json::Value) -> bool {
    !matches!(value, serde_json::Value::Object(_) | serde_json::Value::Array(_))
}

fn push_scalar(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::String(s) => out.push_str(s),
        other => out.push_str(&other.to_string()),
    }
}

fn pad(indent: usize, out: &mut String) {
    for _ in 0..indent {
        out.push_str("  ");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn toon_renders_nested_structures() {
        let value = json!({
            "path": "a/b",
            "count": 2,
            "memories": [
                { "path": "a/b/x", "tokenEstimate": 4 },
                { "path": "a/b/y", "tokenEstimate": 1 }
            ],
            "tags": ["one", "two"],
            "empty": []
        });
        let out = render(&value, OutputFormat::Toon);
        // serde_json maps iterate in sorted key order.
        let expected = "\
count: 2
empty:
  (none)
memories:
  -
    path: a/b/x
    tokenEstimate: 4
  -
    path: a/b/y
    tokenEstimate: 1
path: a/b
tags:
  - one
  - two
";
        assert_eq!(out, expected);
    }

    #[test]
    fn json_and_yaml_render() {
        let value = json!({ "a": 1 });
        assert!(render(&value, OutputFormat::Json).contains("\"a\": 1"));
        assert!(render(&value, OutputFormat::Yaml).contains("a: 1"));
    }
}
