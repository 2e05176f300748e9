use std::sync::Arc;
use std::time::Duration;

use genrelay::llm::{AttemptOutcome, GenerationRequest, ManualClock, MessageRole, Orchestrator};
use genrelay::GenerationError;

use crate::scripted_backend::{ScriptedBackend, lineup, ok, unauthorized, unavailable};

#[tokio::test]
async fn unavailable_preference_routes_by_priority() {
    // openai is never registered, so the preference is ignored.
    let anthropic = ScriptedBackend::new("anthropic", vec![ok("from anthropic")]);
    let gemini = ScriptedBackend::new("gemini", vec![ok("from gemini")]);
    let orchestrator = Orchestrator::with_adapters(lineup(&[(2, &gemini), (1, &anthropic)]));

    let request = GenerationRequest::builder("hello")
        .preferred_backend("openai")
        .build();
    assert_eq!(orchestrator.trial_order(&request), vec!["anthropic", "gemini"]);

    let result = orchestrator.generate(&request).await.unwrap();
    assert_eq!(result.backend_used, "anthropic");
    assert_eq!(result.attempts.len(), 1);
    assert_eq!(result.normalized_payload.as_text(), Some("from anthropic"));
    assert_eq!(gemini.calls(), 0);
}

#[tokio::test]
async fn fatal_error_moves_to_next_backend_without_retry() {
    let clock = Arc::new(ManualClock::default());
    let openai = ScriptedBackend::new("openai", vec![unauthorized("openai")]);
    let anthropic = ScriptedBackend::new("anthropic", vec![ok("recovered")]);
    let orchestrator = Orchestrator::with_adapters(lineup(&[(0, &openai), (1, &anthropic)]))
        .with_clock(clock.clone());

    let result = orchestrator
        .generate(&GenerationRequest::builder("hi").build())
        .await
        .unwrap();

    assert_eq!(openai.calls(), 1);
    assert_eq!(result.backend_used, "anthropic");
    assert_eq!(result.attempts.len(), 2);
    assert_eq!(result.attempts[0].outcome, AttemptOutcome::FatalError);
    assert_eq!(result.attempts[1].outcome, AttemptOutcome::Success);
    assert!(clock.sleeps().is_empty());
}

#[tokio::test]
async fn recoverable_errors_back_off_exponentially() {
    let clock = Arc::new(ManualClock::default());
    let openai = ScriptedBackend::new(
        "openai",
        vec![unavailable("openai"), unavailable("openai"), ok("third time")],
    );
    let orchestrator =
        Orchestrator::with_adapters(lineup(&[(0, &openai)])).with_clock(clock.clone());

    let result = orchestrator
        .generate(&GenerationRequest::builder("hi").build())
        .await
        .unwrap();

    assert_eq!(result.normalized_payload.as_text(), Some("third time"));
    assert_eq!(openai.calls(), 3);
    assert_eq!(
        clock.sleeps(),
        vec![Duration::from_secs(2), Duration::from_secs(4)]
    );
    let numbers: Vec<u32> = result.attempts.iter().map(|a| a.attempt_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    assert_eq!(result.input_tokens, Some(10));
}

#[tokio::test]
async fn exhaustion_reports_every_attempt() {
    let clock = Arc::new(ManualClock::default());
    let openai = ScriptedBackend::new(
        "openai",
        vec![
            unavailable("openai"),
            unavailable("openai"),
            unavailable("openai"),
        ],
    );
    let gemini = ScriptedBackend::new("gemini", vec![unauthorized("gemini")]);
    let orchestrator = Orchestrator::with_adapters(lineup(&[(0, &openai), (1, &gemini)]))
        .with_clock(clock.clone());

    let err = orchestrator
        .generate(&GenerationRequest::builder("hi").build())
        .await
        .unwrap_err();

    let GenerationError::AllBackendsExhausted { attempts, last_error } = &err else {
        panic!("expected exhaustion, got {err:?}");
    };
    assert_eq!(attempts.len(), 4);
    assert_eq!(err.backends_tried(), vec!["openai", "gemini"]);
    assert_eq!(last_error.as_ref().map(|e| e.backend.as_str()), Some("gemini"));

    let message = err.to_string();
    assert!(message.contains("openai"));
    assert!(message.contains("gave up after retries"));
    assert!(message.contains("gemini"));
    assert!(message.contains("not retryable"));
    assert!(!message.contains("sk-"));
}

#[tokio::test]
async fn system_prompt_is_folded_for_backends_without_system_role() {
    let plain = ScriptedBackend::without_system_role("plain", vec![ok("done")]);
    let orchestrator = Orchestrator::with_adapters(lineup(&[(0, &plain)]));

    let request = GenerationRequest::builder("fix my loop")
        .system_prompt("You are a strict reviewer.")
        .history_turn("user", "earlier question")
        .history_turn("assistant", "earlier answer")
        .build();
    orchestrator.generate(&request).await.unwrap();

    let seen = plain.seen();
    let messages = &seen[0];
    assert!(messages.iter().all(|m| m.role != MessageRole::System));
    assert_eq!(messages[0].role, MessageRole::User);
    assert!(messages[0].content.starts_with("You are a strict reviewer."));
    assert!(messages[0].content.contains("earlier question"));
    assert_eq!(messages.last().unwrap().content, "fix my loop");
}
