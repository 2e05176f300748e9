//! Turn raw model text into the payload shape the caller asked for.
//!
//! Normalization never fails: malformed structured output degrades into a
//! synthesized object carrying a diagnostic.

pub mod fence;
pub mod json;
pub mod synonyms;

use super::types::{JsonShape, NormalizedPayload, ResponseShape};
use serde_json::{Map, Value};

const EXPLANATION_KEY: &str = "explanation";

pub fn normalize(raw_text: &str, shape: &ResponseShape) -> NormalizedPayload {
    match shape {
        ResponseShape::FreeText => NormalizedPayload::Text {
            text: raw_text.trim().to_string(),
        },
        ResponseShape::CodeBlock => normalize_code(raw_text),
        ResponseShape::StructuredJson(json_shape) => normalize_structured(raw_text, json_shape),
    }
}

fn normalize_code(raw_text: &str) -> NormalizedPayload {
    match fence::first_fenced_block(raw_text) {
        Some(block) => NormalizedPayload::Code {
            language: block.language.map(str::to_string),
            code: block.body.to_string(),
        },
        None => NormalizedPayload::Code {
            language: None,
            code: raw_text.trim().to_string(),
        },
    }
}

fn normalize_structured(raw_text: &str, shape: &JsonShape) -> NormalizedPayload {
    let mut object = match json::extract_object(raw_text) {
        Ok(object) => object,
        Err(reasons) => return fallback_object(shape, &reasons),
    };

    let renamed = synonyms::reconcile(&mut object, shape);
    if !renamed.is_empty() {
        tracing::debug!(renamed = renamed.len(), "Renamed synonym keys in structured response");
    }

    let missing: Vec<&str> = shape
        .expected_keys
        .iter()
        .map(String::as_str)
        .filter(|key| !object.contains_key(*key))
        .collect();
    if missing.is_empty() {
        return NormalizedPayload::Structured {
            value: object,
            diagnostic: None,
        };
    }

    for key in &missing {
        object.insert((*key).to_string(), shape.default_for(key));
    }
    let diagnostic = format!(
        "Response was missing expected keys: {}; defaults were used.",
        missing.join(", ")
    );
    tracing::warn!(missing = missing.len(), "Structured response incomplete");

    if is_blank(object.get(EXPLANATION_KEY)) {
        object.insert(EXPLANATION_KEY.to_string(), Value::String(diagnostic.clone()));
    }
    NormalizedPayload::Structured {
        value: object,
        diagnostic: Some(diagnostic),
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

fn fallback_object(shape: &JsonShape, reasons: &[String]) -> NormalizedPayload {
    let diagnostic = format!(
        "Could not parse a JSON object from the model response ({}).",
        reasons.join("; ")
    );
    tracing::warn!("Structured response unparseable, using fallback object");

    let mut value = Map::new();
    for key in &shape.expected_keys {
        value.insert(key.clone(), shape.default_for(key));
    }
    if is_blank(value.get(EXPLANATION_KEY)) {
        value.insert(EXPLANATION_KEY.to_string(), Value::String(diagnostic.clone()));
    }
    NormalizedPayload::Structured {
        value,
        diagnostic: Some(diagnostic),
    }
}
