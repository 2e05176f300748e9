use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ── Messages ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    /// Parse a caller-supplied role. Unknown roles become `User`.
    pub fn from_loose(role: &str) -> Self {
        match role.trim().to_ascii_lowercase().as_str() {
            "system" => Self::System,
            "assistant" => Self::Assistant,
            _ => Self::User,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Size used by the context budget.
    pub fn size(&self) -> usize {
        self.content.chars().count()
    }
}

/// The finalized, role-tagged message sequence sent to a backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageList {
    messages: Vec<ChatMessage>,
    dropped: usize,
}

impl MessageList {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            dropped: 0,
        }
    }

    pub(crate) fn with_dropped(messages: Vec<ChatMessage>, dropped: usize) -> Self {
        Self { messages, dropped }
    }

    pub fn as_slice(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChatMessage> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of history messages removed to fit the context budget.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn total_size(&self) -> usize {
        self.messages.iter().map(ChatMessage::size).sum()
    }

    pub fn into_vec(self) -> Vec<ChatMessage> {
        self.messages
    }
}

impl<'a> IntoIterator for &'a MessageList {
    type Item = &'a ChatMessage;
    type IntoIter = std::slice::Iter<'a, ChatMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

// ── Response shapes ─────────────────────────────────────────────────────────

/// Expected keys of a structured response, plus safe per-key defaults used
/// when the model output cannot supply them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonShape {
    pub expected_keys: Vec<String>,
    #[serde(default)]
    pub defaults: Map<String, Value>,
}

impl JsonShape {
    pub fn new<I, S>(expected_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            expected_keys: expected_keys.into_iter().map(Into::into).collect(),
            defaults: Map::new(),
        }
    }

    pub fn with_default(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.insert(key.into(), value.into());
        self
    }

    pub fn default_for(&self, key: &str) -> Value {
        self.defaults
            .get(key)
            .cloned()
            .unwrap_or_else(|| Value::String(String::new()))
    }

    pub fn expects(&self, key: &str) -> bool {
        self.expected_keys.iter().any(|k| k == key)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseShape {
    #[default]
    FreeText,
    CodeBlock,
    StructuredJson(JsonShape),
}

impl ResponseShape {
    pub fn structured<I, S>(expected_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::StructuredJson(JsonShape::new(expected_keys))
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, Self::StructuredJson(_))
    }
}

// ── Requests ────────────────────────────────────────────────────────────────

/// One prior conversation turn as supplied by the caller. The role is kept
/// verbatim; coercion happens during prompt assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: String,
    pub content: String,
}

/// A content-generation request. Built once through
/// [`GenerationRequest::builder`] and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    system_prompt: String,
    history: Vec<HistoryTurn>,
    user_message: String,
    preferred_backend: Option<String>,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    response_shape: ResponseShape,
}

impl GenerationRequest {
    pub fn builder(user_message: impl Into<String>) -> GenerationRequestBuilder {
        GenerationRequestBuilder {
            request: Self {
                system_prompt: String::new(),
                history: Vec::new(),
                user_message: user_message.into(),
                preferred_backend: None,
                temperature: None,
                max_tokens: None,
                response_shape: ResponseShape::FreeText,
            },
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn history(&self) -> &[HistoryTurn] {
        &self.history
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn preferred_backend(&self) -> Option<&str> {
        self.preferred_backend.as_deref()
    }

    pub fn temperature(&self) -> Option<f64> {
        self.temperature
    }

    pub fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
    }

    pub fn response_shape(&self) -> &ResponseShape {
        &self.response_shape
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequestBuilder {
    request: GenerationRequest,
}

impl GenerationRequestBuilder {
    pub fn system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.request.system_prompt = system_prompt.into();
        self
    }

    pub fn history_turn(mut self, role: impl Into<String>, content: impl Into<String>) -> Self {
        self.request.history.push(HistoryTurn {
            role: role.into(),
            content: content.into(),
        });
        self
    }

    pub fn history(mut self, turns: impl IntoIterator<Item = HistoryTurn>) -> Self {
        self.request.history.extend(turns);
        self
    }

    pub fn preferred_backend(mut self, backend: impl Into<String>) -> Self {
        self.request.preferred_backend = Some(backend.into().trim().to_ascii_lowercase());
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.request.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.request.max_tokens = Some(max_tokens);
        self
    }

    pub fn response_shape(mut self, shape: ResponseShape) -> Self {
        self.request.response_shape = shape;
        self
    }

    pub fn build(self) -> GenerationRequest {
        self.request
    }
}

/// Resolved per-request knobs handed to the execution engine.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub temperature: f64,
    pub max_tokens: u32,
    pub shape: ResponseShape,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 4000,
            shape: ResponseShape::FreeText,
        }
    }
}

/// What a backend adapter receives alongside the messages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionParams {
    pub temperature: f64,
    pub max_tokens: u32,
    /// Ask the backend for a JSON object, when it supports that natively.
    pub json_mode: bool,
}

// ── Completions and results ─────────────────────────────────────────────────

/// Adapter-neutral completion returned by every backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCompletion {
    pub text: String,
    pub model: Option<String>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

impl RawCompletion {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: None,
            input_tokens: None,
            output_tokens: None,
        }
    }

    pub fn with_usage(mut self, input_tokens: u64, output_tokens: u64) -> Self {
        self.input_tokens = Some(input_tokens);
        self.output_tokens = Some(output_tokens);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn total_tokens(&self) -> Option<u64> {
        match (self.input_tokens, self.output_tokens) {
            (Some(input), Some(output)) => Some(input + output),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    RecoverableError,
    FatalError,
    Cancelled,
}

/// One try against one backend. Only the execution engine creates these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationAttempt {
    pub backend_id: String,
    /// 1-based, counted per backend.
    pub attempt_number: u32,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub outcome: AttemptOutcome,
    pub error_detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizedPayload {
    Text {
        text: String,
    },
    Code {
        language: Option<String>,
        code: String,
    },
    Structured {
        value: Map<String, Value>,
        /// Set when the payload was repaired or synthesized.
        diagnostic: Option<String>,
    },
}

impl NormalizedPayload {
    /// Best plain-text view of the payload.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Code { code, .. } => Some(code),
            Self::Structured { .. } => None,
        }
    }

    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Structured { value, .. } => Some(value),
            Self::Text { .. } | Self::Code { .. } => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|obj| obj.get(key))
    }

    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            Self::Structured { diagnostic, .. } => diagnostic.as_deref(),
            Self::Text { .. } | Self::Code { .. } => None,
        }
    }
}

/// Successful outcome of one generation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationResult {
    pub raw_text: String,
    pub normalized_payload: NormalizedPayload,
    pub backend_used: String,
    pub model: Option<String>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    /// Diagnostic only.
    pub attempts: Vec<GenerationAttempt>,
}
