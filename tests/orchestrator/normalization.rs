use genrelay::llm::{GenerationRequest, JsonShape, NormalizedPayload, Orchestrator, ResponseShape};
use serde_json::json;

use crate::scripted_backend::{ScriptedBackend, lineup, ok};

fn review_request() -> GenerationRequest {
    GenerationRequest::builder("review this function")
        .response_shape(ResponseShape::StructuredJson(
            JsonShape::new(["corrected_code", "changes", "explanation"])
                .with_default("corrected_code", "")
                .with_default("changes", json!([])),
        ))
        .build()
}

#[tokio::test]
async fn fenced_camel_case_json_is_normalized() {
    let raw = "Here you go:\n```json\n{\"correctedCode\": \"x = 1\", \"changes\": [\"renamed\"], \"explanation\": \"ok\"}\n```";
    let backend = ScriptedBackend::new("openai", vec![ok(raw)]);
    let orchestrator = Orchestrator::with_adapters(lineup(&[(0, &backend)]));

    let result = orchestrator.generate(&review_request()).await.unwrap();
    assert_eq!(result.raw_text, raw);
    assert_eq!(result.normalized_payload.get("corrected_code"), Some(&json!("x = 1")));
    assert_eq!(result.normalized_payload.get("changes"), Some(&json!(["renamed"])));
    assert!(result.normalized_payload.diagnostic().is_none());
}

#[tokio::test]
async fn unparseable_structured_output_still_succeeds() {
    let backend = ScriptedBackend::new("openai", vec![ok("I could not do that, sorry.")]);
    let orchestrator = Orchestrator::with_adapters(lineup(&[(0, &backend)]));

    let result = orchestrator.generate(&review_request()).await.unwrap();
    let NormalizedPayload::Structured { value, diagnostic } = &result.normalized_payload else {
        panic!("expected structured payload");
    };
    assert_eq!(value["corrected_code"], json!(""));
    assert_eq!(value["changes"], json!([]));
    assert!(!value["explanation"].as_str().unwrap().is_empty());
    assert!(diagnostic.is_some());
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn code_shape_extracts_fenced_block() {
    let backend = ScriptedBackend::new(
        "anthropic",
        vec![ok("Sure:\n```rust\nfn main() {}\n```\nDone.")],
    );
    let orchestrator = Orchestrator::with_adapters(lineup(&[(0, &backend)]));
    let request = GenerationRequest::builder("write main")
        .response_shape(ResponseShape::CodeBlock)
        .build();

    let result = orchestrator.generate(&request).await.unwrap();
    assert_eq!(
        result.normalized_payload,
        NormalizedPayload::Code {
            language: Some("rust".into()),
            code: "fn main() {}".into(),
        }
    );
}
