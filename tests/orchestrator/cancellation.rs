use std::time::Duration;

use genrelay::llm::{AttemptOutcome, GenerationRequest, Orchestrator};
use genrelay::GenerationError;
use tokio_util::sync::CancellationToken;

use crate::scripted_backend::{ScriptedBackend, lineup, ok};

#[tokio::test]
async fn cancellation_during_call_stops_fallback() {
    let slow = ScriptedBackend::hanging("openai");
    let next = ScriptedBackend::new("anthropic", vec![ok("never used")]);
    let orchestrator = Orchestrator::with_adapters(lineup(&[(0, &slow), (1, &next)]));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = orchestrator
        .generate_with_cancel(&GenerationRequest::builder("hi").build(), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, GenerationError::Cancelled { .. }));
    assert_eq!(err.attempts().len(), 1);
    assert_eq!(err.attempts()[0].outcome, AttemptOutcome::Cancelled);
    assert_eq!(next.calls(), 0);
}

#[tokio::test]
async fn already_cancelled_request_makes_no_calls() {
    let backend = ScriptedBackend::new("openai", vec![ok("unused")]);
    let orchestrator = Orchestrator::with_adapters(lineup(&[(0, &backend)]));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = orchestrator
        .generate_with_cancel(&GenerationRequest::builder("hi").build(), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, GenerationError::Cancelled { .. }));
    assert_eq!(backend.calls(), 0);
}
