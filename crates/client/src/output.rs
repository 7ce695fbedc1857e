//! Rendering of command results.

use std::{fmt, str::FromStr};

use serde_json::Value;

use crate::errors::ClientError;

/// How command results are printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Indented `key: value` lines.
    #[default]
    Text,

    /// Pretty printed JSON.
    Json,
}

impl FromStr for OutputFormat {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(ClientError::InvalidOutputFormat(other.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Json => "json",
        })
    }
}

impl OutputFormat {
    /// Renders `value` in this format.
    pub fn render(&self, value: &Value) -> Result<String, ClientError> {
        match self {
            Self::Json => Ok(serde_json::to_string_pretty(value)?),
            Self::Text => {
                let mut out = String::new();
                render_text(value, 0, &mut out);
                Ok(out.trim_end().to_string())
            }
        }
    }
}

fn render_text(value: &Value, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    match value {
        Value::Object(map) => {
            for (key, value) in map {
                if is_scalar(value) {
                    out.push_str(&format!("{indent}{key}: {}\n", scalar(value)));
                } else {
                    out.push_str(&format!("{indent}{key}:\n"));
                    render_text(value, depth + 1, out);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                if is_scalar(item) {
                    out.push_str(&format!("{indent}- {}\n", scalar(item)));
                } else {
                    out.push_str(&format!("{indent}-\n"));
                    render_text(item, depth + 1, out);
                }
            }
        }
        other => out.push_str(&format!("{indent}{}\n", scalar(other))),
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Object(_) | Value::Array(_))
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_text_rendering() {
        let value = json!({
            "height": 12,
            "moniker": "val-0",
            "peers": ["a", "b"],
            "sync": { "catching_up": false }
        });
        let text = OutputFormat::Text.render(&value).unwrap();
        assert_eq!(
            text,
            "height: 12\nmoniker: val-0\npeers:\n  - a\n  - b\nsync:\n  catching_up: false"
        );
    }

    #[test]
    fn test_json_rendering_roundtrips() {
        let value = json!({ "a": [1, 2, { "b": null }] });
        let text = OutputFormat::Json.render(&value).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&text).unwrap(), value);
    }

    #[test]
    fn test_parse() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("yaml".parse::<OutputFormat>().is_err());
    }
}
