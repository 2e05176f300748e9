use crate::llm::scrub::sanitize_api_error;
use crate::llm::types::{AttemptOutcome, GenerationAttempt};
use serde::Serialize;
use std::fmt::Write as _;
use thiserror::Error;

// ─── Config errors ───────────────────────────────────────────────────────────

/// Rejected configuration values. Reading and parsing failures stay
/// `anyhow` errors with file context.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("validation failed: {0}")]
    Validation(String),
}

// ─── Provider errors ────────────────────────────────────────────────────────

/// Coarse transport-level category attached to every [`ProviderError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// The backend answered with a non-success HTTP status.
    Http,
    Timeout,
    Connection,
    /// The response body could not be decoded.
    Decode,
    MissingCredential,
    /// The backend answered successfully but produced no text.
    EmptyResponse,
    Other,
}

/// A single failed backend call, as reported by a backend adapter.
///
/// `status` and `code` are the machine-usable hints the retry classifier
/// inspects; `message` is already scrubbed of secrets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{backend}: {message}")]
pub struct ProviderError {
    pub backend: String,
    pub kind: ProviderErrorKind,
    pub status: Option<u16>,
    pub code: Option<String>,
    pub message: String,
}

impl ProviderError {
    pub fn new(
        backend: impl Into<String>,
        kind: ProviderErrorKind,
        message: impl AsRef<str>,
    ) -> Self {
        Self {
            backend: backend.into(),
            kind,
            status: None,
            code: None,
            message: sanitize_api_error(message.as_ref()),
        }
    }

    pub fn http(
        backend: impl Into<String>,
        status: u16,
        code: Option<String>,
        message: impl AsRef<str>,
    ) -> Self {
        Self {
            status: Some(status),
            code,
            ..Self::new(backend, ProviderErrorKind::Http, message)
        }
    }

    pub fn timeout(backend: impl Into<String>, message: impl AsRef<str>) -> Self {
        Self::new(backend, ProviderErrorKind::Timeout, message)
    }

    pub fn missing_credential(backend: impl Into<String>) -> Self {
        let backend = backend.into();
        let message = format!("no credential configured for backend {backend}");
        Self::new(backend, ProviderErrorKind::MissingCredential, message)
    }

    pub fn empty_response(backend: impl Into<String>) -> Self {
        Self::new(
            backend,
            ProviderErrorKind::EmptyResponse,
            "backend returned no text",
        )
    }

    pub fn other(backend: impl Into<String>, message: impl AsRef<str>) -> Self {
        Self::new(backend, ProviderErrorKind::Other, message)
    }

    /// Map a transport error from `reqwest` onto the provider taxonomy.
    pub fn from_reqwest(backend: impl Into<String>, err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ProviderErrorKind::Timeout
        } else if err.is_connect() {
            ProviderErrorKind::Connection
        } else if err.is_decode() {
            ProviderErrorKind::Decode
        } else if err.status().is_some() {
            ProviderErrorKind::Http
        } else {
            ProviderErrorKind::Other
        };
        Self {
            status: err.status().map(|s| s.as_u16()),
            ..Self::new(backend, kind, err.to_string())
        }
    }
}

// ─── Generation errors ──────────────────────────────────────────────────────

/// The only failures a caller of the orchestrator ever sees.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("{}", render_exhausted(.attempts, .last_error.as_ref()))]
    AllBackendsExhausted {
        attempts: Vec<GenerationAttempt>,
        last_error: Option<ProviderError>,
    },

    #[error("generation cancelled after {} attempt(s)", .attempts.len())]
    Cancelled { attempts: Vec<GenerationAttempt> },
}

impl GenerationError {
    pub fn attempts(&self) -> &[GenerationAttempt] {
        match self {
            Self::AllBackendsExhausted { attempts, .. } | Self::Cancelled { attempts } => attempts,
        }
    }

    pub fn last_error(&self) -> Option<&ProviderError> {
        match self {
            Self::AllBackendsExhausted { last_error, .. } => last_error.as_ref(),
            Self::Cancelled { .. } => None,
        }
    }

    /// Backend ids in the order they were first tried.
    pub fn backends_tried(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for attempt in self.attempts() {
            if !seen.contains(&attempt.backend_id.as_str()) {
                seen.push(&attempt.backend_id);
            }
        }
        seen
    }
}

fn render_exhausted(attempts: &[GenerationAttempt], last_error: Option<&ProviderError>) -> String {
    if attempts.is_empty() {
        return "No generation backend is available. Configure at least one backend credential \
                (for example OPENAI_API_KEY, ANTHROPIC_API_KEY or GEMINI_API_KEY)."
            .to_string();
    }

    let mut out = String::from("All generation backends failed:");
    let mut order: Vec<&str> = Vec::new();
    for attempt in attempts {
        if !order.contains(&attempt.backend_id.as_str()) {
            order.push(&attempt.backend_id);
        }
    }

    for backend in order {
        let tried: Vec<&GenerationAttempt> = attempts
            .iter()
            .filter(|a| a.backend_id == backend)
            .collect();
        let Some(last) = tried.last() else {
            continue;
        };
        let reason = last.error_detail.as_deref().unwrap_or("unknown error");
        let verdict = match last.outcome {
            AttemptOutcome::RecoverableError => "gave up after retries",
            AttemptOutcome::FatalError => "not retryable",
            AttemptOutcome::Cancelled => "cancelled",
            AttemptOutcome::Success => "succeeded",
        };
        let _ = write!(
            out,
            "\n- {backend}: {} attempt(s), {verdict}: {reason}",
            tried.len()
        );
    }

    if let Some(err) = last_error {
        let _ = write!(out, "\nLast error: {err}");
    }
    out
}
