use serde_json::{Map, Value};

use crate::llm::types::JsonShape;

/// Known alternate spellings models use for canonical keys.
const SYNONYMS: [(&str, &str); 5] = [
    ("correctedCode", "corrected_code"),
    ("improvedCode", "improved_code"),
    ("lineNumbers", "line_numbers"),
    ("fixedCode", "corrected_code"),
    ("explanations", "explanation"),
];

/// `correctedCode` -> `corrected_code`.
pub fn camel_to_snake(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (i, c) in key.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn canonical_for(key: &str, shape: &JsonShape) -> Option<String> {
    if shape.expects(key) {
        return None;
    }
    if let Some((_, canonical)) = SYNONYMS.iter().find(|(alias, _)| *alias == key) {
        return Some((*canonical).to_string());
    }
    let snake = camel_to_snake(key);
    (snake != key && shape.expects(&snake)).then_some(snake)
}

/// Rename synonym keys to their canonical form in place. A canonical key
/// already present wins over its synonym. Returns the `(from, to)` pairs
/// that were applied.
pub fn reconcile(object: &mut Map<String, Value>, shape: &JsonShape) -> Vec<(String, String)> {
    let renames: Vec<(String, String)> = object
        .keys()
        .filter_map(|key| canonical_for(key, shape).map(|canonical| (key.clone(), canonical)))
        .collect();

    let mut applied = Vec::new();
    for (from, to) in renames {
        if object.contains_key(&to) {
            continue;
        }
        if let Some(value) = object.remove(&from) {
            object.insert(to.clone(), value);
            applied.push((from, to));
        }
    }
    applied
}
