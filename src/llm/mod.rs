// ── Infrastructure ───────────────────────────────────────────────────────────
pub mod clock;
pub mod http_client;
pub mod scrub;
pub mod traits;
pub mod types;

// ── Orchestration pipeline ──────────────────────────────────────────────────
pub mod engine;
pub mod factory;
pub mod normalize;
pub mod orchestrator;
pub mod prompt;
pub mod registry;
pub mod retry;
pub mod router;

// ── Backend adapters ────────────────────────────────────────────────────────
pub mod anthropic;
pub mod gemini;
pub mod openai;

// ── Re-exports ──────────────────────────────────────────────────────────────
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::ExecutionEngine;
pub use factory::{build_backends, create_adapter};
pub use http_client::{build_provider_client, build_provider_client_with_timeout};
pub use normalize::normalize;
pub use orchestrator::Orchestrator;
pub use prompt::{ContextBudget, assemble};
pub use registry::{
    BackendDescriptor, BackendSpec, CredentialStore, EnvCredentialStore, ProviderRegistry,
    StaticCredentialStore,
};
pub use retry::{
    DefaultClassifier, ErrorClass, ErrorClassifier, RetryOutcome, RetryPolicy, RetryRun,
    with_retry,
};
pub use router::route;
pub use scrub::{api_error, sanitize_api_error, scrub_secret_patterns};
pub use traits::{BackendAdapter, BackendCapabilities, CompletionFuture};
pub use types::{
    AttemptOutcome, ChatMessage, CompletionParams, GenerationAttempt, GenerationParams,
    GenerationRequest, GenerationResult, HistoryTurn, JsonShape, MessageList, MessageRole,
    NormalizedPayload, RawCompletion, ResponseShape,
};

pub use anthropic::AnthropicAdapter;
pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;
