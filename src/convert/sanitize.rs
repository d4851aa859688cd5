//! Best-effort cleanup of raw model output into code or JSON.
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// Shape the caller expects back from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Code,
    Json,
}

/// The response could not be turned into usable output. Carries the raw text.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("could not sanitize response: {reason}")]
pub struct SanitizeFailure {
    pub reason: String,
    pub raw: String,
}

impl SanitizeFailure {
    fn new(reason: impl Into<String>, raw: &str) -> Self {
        Self {
            reason: reason.into(),
            raw: raw.to_string(),
        }
    }
}

static CODE_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^\s*(const |let |var |import |export |require\(|module\.exports|exports\.|['"]use strict['"]|function[\s*(]|async |class |router\.|app\.|/\*|//|[{}\[(@])"#,
    )
    .expect("valid regex")
});

pub fn sanitize(raw: &str, format: OutputFormat) -> Result<String, SanitizeFailure> {
    match format {
        OutputFormat::Code => sanitize_code(raw),
        OutputFormat::Json => {
            let value = sanitize_json(raw)?;
            serde_json::to_string_pretty(&value)
                .map_err(|e| SanitizeFailure::new(format!("re-serialization failed: {e}"), raw))
        }
    }
}

/// Extracts source code: the first fenced block if there is one, otherwise the
/// text with leading and trailing prose removed.
pub fn sanitize_code(raw: &str) -> Result<String, SanitizeFailure> {
    let body = match fenced_block(raw) {
        Some(block) => block,
        None => trim_prose(raw),
    };
    let body = body.trim_matches('\n').trim_end();
    if body.trim().is_empty() {
        return Err(SanitizeFailure::new("no code found in response", raw));
    }
    Ok(body.to_string())
}

/// Parses a JSON object or array out of the response, repairing truncation
/// and trailing commas when a plain parse fails.
pub fn sanitize_json(raw: &str) -> Result<Value, SanitizeFailure> {
    let body = fenced_block(raw).unwrap_or_else(|| raw.to_string());
    let start = body
        .find(['{', '['])
        .ok_or_else(|| SanitizeFailure::new("no JSON object or array found", raw))?;
    let candidate = body[start..].trim();

    if let Ok(value) = serde_json::from_str(candidate) {
        return Ok(value);
    }
    let repaired = repair_json(candidate);
    serde_json::from_str(&repaired)
        .map_err(|e| SanitizeFailure::new(format!("unrepairable JSON: {e}"), raw))
}

/// Body of the first ``` fence; an unterminated fence runs to the end.
fn fenced_block(raw: &str) -> Option<String> {
    let mut lines = raw.lines();
    lines.by_ref().find(|l| l.trim_start().starts_with("```"))?;
    let block: Vec<&str> = lines
        .take_while(|l| !l.trim_start().starts_with("```"))
        .collect();
    Some(block.join("\n"))
}

fn is_prose(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() || CODE_START.is_match(trimmed) {
        return false;
    }
    trimmed.starts_with(|c: char| c.is_alphabetic())
        && !trimmed.contains([';', '{', '}', '(', ')', '=', '[', ']', '<', '>'])
}

/// Sentence-like postamble such as `Note: this uses CommonJS (require).`
fn is_closing_prose(line: &str) -> bool {
    let trimmed = line.trim();
    if is_prose(trimmed) {
        return true;
    }
    !CODE_START.is_match(trimmed)
        && trimmed.starts_with(|c: char| c.is_alphabetic())
        && trimmed.contains(' ')
        && trimmed.ends_with(['.', '!', '?', ':'])
}

fn trim_prose(raw: &str) -> String {
    let lines: Vec<&str> = raw.lines().collect();
    let start = lines
        .iter()
        .position(|l| CODE_START.is_match(l))
        .or_else(|| lines.iter().position(|l| !l.trim().is_empty() && !is_prose(l)));
    let end = lines
        .iter()
        .rposition(|l| !l.trim().is_empty() && !is_closing_prose(l));

    match (start, end) {
        (Some(start), Some(end)) if start <= end => lines[start..=end].join("\n"),
        _ => String::new(),
    }
}

fn drop_trailing_comma(out: &mut String) {
    let trimmed = out.trim_end().len();
    out.truncate(trimmed);
    if out.ends_with(',') {
        out.pop();
    }
}

fn repair_json(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut closers: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for ch in text.chars() {
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            '{' => {
                closers.push('}');
                out.push(ch);
            }
            '[' => {
                closers.push(']');
                out.push(ch);
            }
            '}' | ']' => {
                // Stray closers are dropped.
                if closers.last() == Some(&ch) {
                    closers.pop();
                    drop_trailing_comma(&mut out);
                    out.push(ch);
                    if closers.is_empty() {
                        break;
                    }
                }
            }
            _ => out.push(ch),
        }
    }

    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }
    drop_trailing_comma(&mut out);
    if out.ends_with(':') {
        out.push_str(" null");
    }
    while let Some(closer) = closers.pop() {
        drop_trailing_comma(&mut out);
        out.push(closer);
    }
    out
}
