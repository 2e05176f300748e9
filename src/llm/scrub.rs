use crate::error::ProviderError;
use std::borrow::Cow;

const MAX_API_ERROR_CHARS: usize = 200;
const REDACTED: &str = "[REDACTED]";

/// Token prefixes whose following characters are a credential.
const PREFIX_PATTERNS: [&str; 12] = [
    "sk-",
    "sk-ant-",
    "ghp_",
    "github_pat_",
    "hf_",
    "ya29.",
    "AIza",
    "AKIA",
    "ASIA",
    "eyJ",
    "GOCSPX-",
    "xoxb-",
];

/// Header, query and JSON markers whose value is a credential.
const MARKER_PATTERNS: [&str; 12] = [
    "Authorization: Bearer ",
    "authorization: bearer ",
    "x-api-key: ",
    "x-goog-api-key: ",
    "api_key=",
    "key=",
    "access_token=",
    "\"api_key\":\"",
    "\"access_token\":\"",
    "\"token\":\"",
    "\"secret\":\"",
    "\"password\":\"",
];

fn is_secret_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '+' | '/' | '=')
}

fn token_end(input: &str, from: usize) -> usize {
    input[from..]
        .char_indices()
        .find(|(_, c)| !is_secret_char(*c))
        .map_or(input.len(), |(i, _)| from + i)
}

fn scrub_after_marker(scrubbed: &mut String, marker: &str) {
    let mut search_from = 0;
    while let Some(rel) = scrubbed[search_from..].find(marker) {
        let start = search_from + rel;
        let content_start = start + marker.len();
        let end = token_end(scrubbed, content_start);

        // Bare markers without a value stay untouched.
        if end == content_start {
            search_from = content_start;
            continue;
        }

        scrubbed.replace_range(start..end, REDACTED);
        search_from = start + REDACTED.len();
    }
}

/// Scrub known secret-like token patterns from provider error strings.
pub fn scrub_secret_patterns(input: &str) -> Cow<'_, str> {
    let needs_scrubbing = PREFIX_PATTERNS
        .iter()
        .chain(MARKER_PATTERNS.iter())
        .any(|pattern| input.contains(pattern));
    if !needs_scrubbing {
        return Cow::Borrowed(input);
    }

    let mut scrubbed = input.to_string();
    for pattern in PREFIX_PATTERNS.iter().chain(MARKER_PATTERNS.iter()) {
        scrub_after_marker(&mut scrubbed, pattern);
    }
    Cow::Owned(scrubbed)
}

/// Sanitize API error text by scrubbing secrets and truncating length.
pub fn sanitize_api_error(input: &str) -> String {
    let scrubbed = scrub_secret_patterns(input);

    let cut = scrubbed
        .char_indices()
        .nth(MAX_API_ERROR_CHARS)
        .map(|(end, _)| end);
    match cut {
        Some(end) => format!("{}...", &scrubbed[..end]),
        None => scrubbed.into_owned(),
    }
}

/// Pull a provider error code out of a JSON error body.
///
/// Understands the OpenAI (`error.code` / `error.type`), Anthropic
/// (`error.type`) and Gemini (`error.status`) envelopes.
pub fn extract_error_code(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    ["code", "type", "status"].iter().find_map(|field| {
        match error.get(*field)? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    })
}

/// Build a sanitized provider error from a failed HTTP response.
pub async fn api_error(backend: &str, display_name: &str, response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read provider error body>".to_string());
    let code = extract_error_code(&body);
    ProviderError::http(
        backend,
        status.as_u16(),
        code,
        format!("{display_name} API error ({status}): {body}"),
    )
}
