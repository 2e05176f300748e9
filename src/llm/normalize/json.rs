//! Three-stage JSON object extraction from model output.
//!
//! Each stage is tried only when the previous one failed:
//! the whole text, then a fenced block, then the first balanced `{...}`.

use super::fence::fenced_blocks;
use serde_json::{Map, Value};

pub type JsonObject = Map<String, Value>;

/// Result of a single extraction stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageResult {
    Parsed(JsonObject),
    Failed(String),
}

impl StageResult {
    pub fn is_parsed(&self) -> bool {
        matches!(self, Self::Parsed(_))
    }
}

fn parse_object(candidate: &str, stage: &str) -> StageResult {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => StageResult::Parsed(map),
        Ok(other) => StageResult::Failed(format!(
            "{stage}: expected a JSON object, found {}",
            json_type_name(&other)
        )),
        Err(e) => StageResult::Failed(format!("{stage}: {e}")),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Stage 1: the whole response is JSON.
pub fn parse_direct(text: &str) -> StageResult {
    parse_object(text.trim(), "direct")
}

/// Stage 2: the first fenced block tagged `json`, or failing that the first
/// untagged fence.
pub fn parse_fenced(text: &str) -> StageResult {
    let blocks = fenced_blocks(text);
    let block = blocks
        .iter()
        .find(|b| b.language.is_some_and(|tag| tag.eq_ignore_ascii_case("json")))
        .or_else(|| blocks.iter().find(|b| b.language.is_none()));
    match block {
        Some(block) => parse_object(block.body, "fenced"),
        None => StageResult::Failed("fenced: no json code block".to_string()),
    }
}

/// Byte index of the `}` closing the `{` at `start`, if it is ever closed.
/// Braces inside JSON strings (including escaped quotes) are ignored.
fn closing_brace(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Balanced, non-overlapping `{...}` spans in order of appearance.
///
/// A `{` that is never closed (a stray brace in prose) is skipped and the
/// scan resumes at the next one.
pub fn balanced_object_spans(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut from = 0usize;

    while let Some(offset) = text[from..].find('{') {
        let start = from + offset;
        match closing_brace(text, start) {
            Some(end) => {
                spans.push(&text[start..=end]);
                from = end + 1;
            }
            None => from = start + 1,
        }
    }
    spans
}

/// Stage 3: the first balanced `{...}` span that parses as an object.
pub fn parse_braced(text: &str) -> StageResult {
    let spans = balanced_object_spans(text);
    let mut first_failure = None;
    for span in spans {
        match parse_object(span, "braced") {
            parsed @ StageResult::Parsed(_) => return parsed,
            StageResult::Failed(reason) => {
                first_failure.get_or_insert(reason);
            }
        }
    }
    StageResult::Failed(
        first_failure.unwrap_or_else(|| "braced: no balanced {...} span".to_string()),
    )
}

/// Run all stages in order. On failure returns every stage's reason.
pub fn extract_object(text: &str) -> Result<JsonObject, Vec<String>> {
    let mut reasons = Vec::with_capacity(3);
    for stage in [parse_direct, parse_fenced, parse_braced] {
        match stage(text) {
            StageResult::Parsed(map) => return Ok(map),
            StageResult::Failed(reason) => reasons.push(reason),
        }
    }
    Err(reasons)
}
