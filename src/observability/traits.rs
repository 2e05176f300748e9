use crate::llm::types::GenerationAttempt;
use std::time::Duration;

/// How a generation request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Success,
    Exhausted,
    Cancelled,
}

impl RequestOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Exhausted => "exhausted",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Events the observer can record
#[derive(Debug, Clone)]
pub enum ObserverEvent {
    /// One try against one backend finished.
    Attempt {
        request_id: String,
        attempt: GenerationAttempt,
    },
    /// A request finished, successfully or not.
    RequestComplete {
        request_id: String,
        backend_used: Option<String>,
        attempts: usize,
        outcome: RequestOutcome,
        duration: Duration,
    },
}

/// Numeric metrics
#[derive(Debug, Clone)]
pub enum ObserverMetric {
    RequestLatency(Duration),
    TokensUsed(u64),
}

/// Logging sink for the execution engine.
pub trait Observer: Send + Sync {
    /// Record a discrete event
    fn record_event(&self, event: &ObserverEvent);

    /// Record a numeric metric
    fn record_metric(&self, metric: &ObserverMetric);

    /// Flush any buffered data (no-op for most backends)
    fn flush(&self) {}

    /// Human-readable name of this observer
    fn name(&self) -> &str;
}
