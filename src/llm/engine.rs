use super::clock::{Clock, SystemClock};
use super::normalize::normalize;
use super::retry::{
    DefaultClassifier, ErrorClassifier, RetryOutcome, RetryPolicy, TryRecord, with_retry,
};
use super::traits::{BackendAdapter, fold_system_into_user};
use super::types::{
    AttemptOutcome, ChatMessage, CompletionParams, GenerationAttempt, GenerationParams,
    GenerationResult, MessageList,
};
use crate::error::{GenerationError, ProviderError};
use crate::observability::{NoopObserver, Observer, ObserverEvent, ObserverMetric, RequestOutcome};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Sequential retry-then-fallback over an ordered list of backends.
pub struct ExecutionEngine {
    adapters: HashMap<String, Arc<dyn BackendAdapter>>,
    policy: RetryPolicy,
    classifier: Arc<dyn ErrorClassifier>,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn Observer>,
}

impl ExecutionEngine {
    pub fn new(adapters: impl IntoIterator<Item = Arc<dyn BackendAdapter>>) -> Self {
        let adapters = adapters
            .into_iter()
            .map(|adapter| (adapter.id().to_ascii_lowercase(), adapter))
            .collect();
        Self {
            adapters,
            policy: RetryPolicy::default(),
            classifier: Arc::new(DefaultClassifier::default()),
            clock: Arc::new(SystemClock),
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn adapter(&self, backend_id: &str) -> Option<&Arc<dyn BackendAdapter>> {
        self.adapters.get(backend_id)
    }

    /// Try each backend of `trial_order` in turn until one succeeds.
    ///
    /// Every try becomes one [`GenerationAttempt`], reported to the observer
    /// as it completes. The first success is normalized into the requested
    /// shape and returned; nothing after it is tried.
    pub async fn execute(
        &self,
        messages: &MessageList,
        trial_order: &[String],
        params: &GenerationParams,
        cancel: Option<&CancellationToken>,
    ) -> Result<GenerationResult, GenerationError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let request_started = self.clock.now();
        let mut attempts: Vec<GenerationAttempt> = Vec::new();
        let mut last_error: Option<ProviderError> = None;

        if trial_order.is_empty() {
            tracing::warn!(request_id = %request_id, "No available backend to try");
        }

        for backend_id in trial_order {
            let Some(adapter) = self.adapters.get(backend_id) else {
                let error = ProviderError::other(backend_id, "no adapter registered");
                let attempt = GenerationAttempt {
                    backend_id: backend_id.clone(),
                    attempt_number: 1,
                    started_at: self.clock.now(),
                    elapsed_ms: 0,
                    outcome: AttemptOutcome::FatalError,
                    error_detail: Some(error.message.clone()),
                };
                self.record_attempt(&request_id, &attempt);
                attempts.push(attempt);
                last_error = Some(error);
                continue;
            };

            let capabilities = adapter.capabilities();
            let folded: Vec<ChatMessage>;
            let backend_messages: &[ChatMessage] = if capabilities.supports_system_role {
                messages.as_slice()
            } else {
                folded = fold_system_into_user(messages.as_slice());
                &folded
            };
            let completion_params = CompletionParams {
                temperature: params.temperature,
                max_tokens: params.max_tokens,
                json_mode: params.shape.is_structured() && capabilities.supports_json_mode,
            };
            let completion_params = &completion_params;

            let run = with_retry(
                &self.policy,
                self.classifier.as_ref(),
                self.clock.as_ref(),
                cancel,
                backend_id,
                |record: &TryRecord| {
                    let attempt = attempt_from_record(backend_id, record);
                    self.record_attempt(&request_id, &attempt);
                    attempts.push(attempt);
                },
                move |_| adapter.complete(backend_messages, completion_params),
            )
            .await;

            match run.outcome {
                RetryOutcome::Succeeded(completion) => {
                    let normalized_payload = normalize(&completion.text, &params.shape);
                    self.finish(
                        &request_id,
                        request_started,
                        Some(backend_id),
                        attempts.len(),
                        RequestOutcome::Success,
                    );
                    if let Some(total) = completion.total_tokens() {
                        self.observer
                            .record_metric(&ObserverMetric::TokensUsed(total));
                    }
                    return Ok(GenerationResult {
                        raw_text: completion.text,
                        normalized_payload,
                        backend_used: backend_id.clone(),
                        model: completion.model,
                        input_tokens: completion.input_tokens,
                        output_tokens: completion.output_tokens,
                        attempts,
                    });
                }
                RetryOutcome::Exhausted(error) | RetryOutcome::Fatal(error) => {
                    tracing::warn!(
                        request_id = %request_id,
                        backend = backend_id.as_str(),
                        "Switching to fallback backend"
                    );
                    last_error = Some(error);
                }
                RetryOutcome::Cancelled => {
                    self.finish(
                        &request_id,
                        request_started,
                        None,
                        attempts.len(),
                        RequestOutcome::Cancelled,
                    );
                    return Err(GenerationError::Cancelled { attempts });
                }
            }
        }

        self.finish(
            &request_id,
            request_started,
            None,
            attempts.len(),
            RequestOutcome::Exhausted,
        );
        Err(GenerationError::AllBackendsExhausted {
            attempts,
            last_error,
        })
    }

    fn record_attempt(&self, request_id: &str, attempt: &GenerationAttempt) {
        self.observer.record_event(&ObserverEvent::Attempt {
            request_id: request_id.to_string(),
            attempt: attempt.clone(),
        });
    }

    fn finish(
        &self,
        request_id: &str,
        started: DateTime<Utc>,
        backend_used: Option<&String>,
        attempts: usize,
        outcome: RequestOutcome,
    ) {
        let duration: Duration = (self.clock.now() - started).to_std().unwrap_or_default();
        self.observer.record_event(&ObserverEvent::RequestComplete {
            request_id: request_id.to_string(),
            backend_used: backend_used.cloned(),
            attempts,
            outcome,
            duration,
        });
        self.observer
            .record_metric(&ObserverMetric::RequestLatency(duration));
    }
}

fn attempt_from_record(backend_id: &str, record: &TryRecord) -> GenerationAttempt {
    let error_detail = match (&record.error, record.outcome) {
        (Some(error), _) => Some(error.message.clone()),
        (None, AttemptOutcome::Cancelled) => Some("cancelled by caller".to_string()),
        (None, _) => None,
    };
    GenerationAttempt {
        backend_id: backend_id.to_string(),
        attempt_number: record.attempt_number,
        started_at: record.started_at,
        elapsed_ms: u64::try_from(record.elapsed.as_millis()).unwrap_or(u64::MAX),
        outcome: record.outcome,
        error_detail,
    }
}
