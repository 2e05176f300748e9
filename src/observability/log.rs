use super::traits::{Observer, ObserverEvent, ObserverMetric};
use crate::llm::types::AttemptOutcome;
use tracing::{info, warn};

/// Log-based observer; emits `generation.*` tracing events
#[derive(Debug, Default)]
pub struct LogObserver;

impl LogObserver {
    pub fn new() -> Self {
        Self
    }
}

impl Observer for LogObserver {
    fn record_event(&self, event: &ObserverEvent) {
        match event {
            ObserverEvent::Attempt {
                request_id,
                attempt,
            } => {
                let outcome = match attempt.outcome {
                    AttemptOutcome::Success => "success",
                    AttemptOutcome::RecoverableError => "recoverable_error",
                    AttemptOutcome::FatalError => "fatal_error",
                    AttemptOutcome::Cancelled => "cancelled",
                };
                if attempt.outcome == AttemptOutcome::Success {
                    info!(
                        request_id = %request_id,
                        backend = %attempt.backend_id,
                        attempt = attempt.attempt_number,
                        elapsed_ms = attempt.elapsed_ms,
                        outcome,
                        "generation.attempt"
                    );
                } else {
                    warn!(
                        request_id = %request_id,
                        backend = %attempt.backend_id,
                        attempt = attempt.attempt_number,
                        elapsed_ms = attempt.elapsed_ms,
                        outcome,
                        error = attempt.error_detail.as_deref().unwrap_or(""),
                        "generation.attempt"
                    );
                }
            }
            ObserverEvent::RequestComplete {
                request_id,
                backend_used,
                attempts,
                outcome,
                duration,
            } => {
                let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
                info!(
                    request_id = %request_id,
                    backend = backend_used.as_deref().unwrap_or("none"),
                    attempts = *attempts,
                    outcome = outcome.as_str(),
                    duration_ms = ms,
                    "generation.complete"
                );
            }
        }
    }

    fn record_metric(&self, metric: &ObserverMetric) {
        match metric {
            ObserverMetric::RequestLatency(d) => {
                let ms = u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
                info!(latency_ms = ms, "metric.request_latency");
            }
            ObserverMetric::TokensUsed(t) => {
                info!(tokens = t, "metric.tokens_used");
            }
        }
    }

    fn name(&self) -> &str {
        "log"
    }
}
