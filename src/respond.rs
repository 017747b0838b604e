//! Response rendering.
//!
//! Every endpoint answers `{"status": "<reason phrase>", ...}` with the same
//! code on the status line. Mappings can also be rendered as a flat shell
//! script (`key="value"` lines, nested keys joined with `_`) for callers that
//! `eval` the response.

use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Map, Value, json};

/// Builds `{"status": <reason>}` merged with `extra`.
pub fn status(code: StatusCode, extra: Value) -> Response {
    let mut payload = Map::new();
    payload.insert(
        "status".to_string(),
        Value::String(code.canonical_reason().unwrap_or("Unknown").to_string()),
    );
    if let Value::Object(fields) = extra {
        payload.extend(fields);
    }
    (code, Json(Value::Object(payload))).into_response()
}

pub fn status_message(code: StatusCode, message: impl Into<String>) -> Response {
    status(code, json!({ "message": message.into() }))
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Json,
    Shell,
}

/// Renders `data` in the requested format.
pub fn render(format: Format, data: &Value) -> Response {
    match format {
        Format::Json => Json(data.clone()).into_response(),
        Format::Shell => (
            [(header::CONTENT_TYPE, "text/x-shellscript")],
            shellify(data),
        )
            .into_response(),
    }
}

/// Flattens a JSON object into `prefix_key="value"` lines.
pub fn shellify(data: &Value) -> String {
    let mut out = String::new();
    match data {
        Value::Object(map) => {
            for (key, value) in map {
                write_var(&mut out, "", key, value);
            }
        }
        other => write_var(&mut out, "", "value", other),
    }
    out
}

fn write_var(out: &mut String, prefix: &str, key: &str, value: &Value) {
    match value {
        Value::Object(map) => {
            let prefix = format!("{prefix}{key}_");
            for (k, v) in map {
                write_var(out, &prefix, k, v);
            }
        }
        Value::Array(items) => {
            let prefix = format!("{prefix}{key}_");
            for (i, v) in items.iter().enumerate() {
                write_var(out, &prefix, &i.to_string(), v);
            }
        }
        Value::String(s) => push_line(out, prefix, key, s),
        Value::Null => push_line(out, prefix, key, ""),
        // numbers and booleans print as JSON does: 3, 1.5, true
        scalar => push_line(out, prefix, key, &scalar.to_string()),
    }
}

fn push_line(out: &mut String, prefix: &str, key: &str, value: &str) {
    out.push_str(prefix);
    out.push_str(key);
    out.push_str("=\"");
    out.push_str(&shell_quote(value));
    out.push_str("\"\n");
}

/// Escapes the characters that stay special inside double quotes.
pub fn shell_quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '"' | '$' | '\\' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
