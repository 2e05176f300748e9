//! Anthropic Messages API.

mod types;

use super::http_client::{build_provider_client, send_json};
use super::traits::{BackendAdapter, BackendCapabilities, CompletionFuture, split_system};
use super::types::{ChatMessage, CompletionParams, MessageRole, RawCompletion};
use crate::error::ProviderError;
use reqwest::Client;
use types::{ChatRequest, ChatResponse, Message, ResponseContentBlock};

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Opening user turn for conversations whose history starts with the
/// assistant; the API rejects a leading assistant message.
const LEADING_USER_TURN: &str = "(conversation continues)";

pub struct AnthropicAdapter {
    id: String,
    model: String,
    api_key: Option<String>,
    messages_url: String,
    capabilities: BackendCapabilities,
    client: Client,
}

impl AnthropicAdapter {
    pub fn new(id: &str, model: &str, api_key: Option<&str>) -> Self {
        Self::with_base_url(id, model, api_key, None)
    }

    pub fn with_base_url(
        id: &str,
        model: &str,
        api_key: Option<&str>,
        base_url: Option<&str>,
    ) -> Self {
        let base = base_url
            .map_or(ANTHROPIC_BASE_URL, |u| u.trim_end_matches('/'))
            .to_string();
        Self {
            id: id.to_string(),
            model: model.to_string(),
            api_key: api_key
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(ToString::to_string),
            messages_url: format!("{base}/v1/messages"),
            capabilities: Self::default_capabilities(),
            client: build_provider_client(),
        }
    }

    /// The system prompt travels in its own field; there is no JSON mode.
    pub fn default_capabilities() -> BackendCapabilities {
        BackendCapabilities {
            supports_system_role: true,
            supports_json_mode: false,
        }
    }

    pub fn with_capabilities(mut self, capabilities: BackendCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// The API wants strictly alternating user/assistant turns starting with
    /// the user, so adjacent turns with the same role are merged and a
    /// leading assistant turn gets a user turn in front of it.
    fn to_wire_messages(messages: &[&ChatMessage]) -> Vec<Message> {
        let mut wire: Vec<Message> = Vec::with_capacity(messages.len() + 1);
        if messages
            .first()
            .is_some_and(|m| m.role == MessageRole::Assistant)
        {
            wire.push(Message {
                role: "user",
                content: LEADING_USER_TURN.to_string(),
            });
        }
        for message in messages {
            let role = match message.role {
                MessageRole::Assistant => "assistant",
                MessageRole::User | MessageRole::System => "user",
            };
            match wire.last_mut() {
                Some(last) if last.role == role => {
                    last.content.push_str("\n\n");
                    last.content.push_str(&message.content);
                }
                _ => wire.push(Message {
                    role,
                    content: message.content.clone(),
                }),
            }
        }
        wire
    }

    fn build_request(&self, messages: &[ChatMessage], params: &CompletionParams) -> ChatRequest {
        let (system, rest) = split_system(messages);
        ChatRequest {
            model: self.model.clone(),
            max_tokens: params.max_tokens,
            system,
            messages: Self::to_wire_messages(&rest),
            temperature: params.temperature,
        }
    }

    fn into_completion(&self, response: ChatResponse) -> Result<RawCompletion, ProviderError> {
        let text = response
            .content
            .iter()
            .filter_map(|block| match block {
                ResponseContentBlock::Text { text } => Some(text.as_str()),
                ResponseContentBlock::Unsupported => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        if text.trim().is_empty() {
            return Err(ProviderError::empty_response(&self.id));
        }

        let mut completion = RawCompletion::text_only(text)
            .with_model(response.model.unwrap_or_else(|| self.model.clone()));
        if let Some(usage) = response.usage {
            completion = completion.with_usage(usage.input_tokens, usage.output_tokens);
        }
        Ok(completion)
    }
}

impl BackendAdapter for AnthropicAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities
    }

    fn complete<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        params: &'a CompletionParams,
    ) -> CompletionFuture<'a> {
        Box::pin(async move {
            let api_key = self
                .api_key
                .as_deref()
                .ok_or_else(|| ProviderError::missing_credential(&self.id))?;

            let request = self
                .client
                .post(&self.messages_url)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .header("x-api-key", api_key)
                .json(&self.build_request(messages, params));

            let response: ChatResponse = send_json(&self.id, "Anthropic", request).await?;
            self.into_completion(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorKind;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn params() -> CompletionParams {
        CompletionParams {
            temperature: 0.2,
            max_tokens: 1024,
            json_mode: false,
        }
    }

    #[test]
    fn system_prompt_moves_to_its_own_field() {
        let adapter = AnthropicAdapter::new("anthropic", "claude-3-5-sonnet-20241022", Some("k"));
        let request = adapter.build_request(
            &[
                ChatMessage::system("persona"),
                ChatMessage::user("first"),
                ChatMessage::user("second"),
                ChatMessage::assistant("reply"),
            ],
            &params(),
        );
        assert_eq!(request.system.as_deref(), Some("persona"));
        assert_eq!(
            request.messages,
            vec![
                Message {
                    role: "user",
                    content: "first\n\nsecond".into()
                },
                Message {
                    role: "assistant",
                    content: "reply".into()
                },
            ]
        );
    }

    #[test]
    fn leading_assistant_turn_gets_a_user_turn_first() {
        let adapter = AnthropicAdapter::new("anthropic", "claude-3-5-sonnet-20241022", Some("k"));
        let request = adapter.build_request(
            &[
                ChatMessage::system("persona"),
                ChatMessage::assistant("How can I help?"),
                ChatMessage::user("fix this"),
            ],
            &params(),
        );
        let roles: Vec<&str> = request.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec!["user", "assistant", "user"]);
        assert_eq!(request.messages[0].content, LEADING_USER_TURN);
        assert_eq!(request.messages[1].content, "How can I help?");
    }

    #[tokio::test]
    async fn completes_with_version_and_key_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-token"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(body_partial_json(json!({"system": "persona", "max_tokens": 1024})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "claude-3-5-sonnet-20241022",
                "content": [
                    {"type": "text", "text": "Hello"},
                    {"type": "thinking", "thinking": "..."}
                ],
                "usage": {"input_tokens": 7, "output_tokens": 2}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = AnthropicAdapter::with_base_url(
            "anthropic",
            "claude-3-5-sonnet-20241022",
            Some("test-token"),
            Some(&server.uri()),
        );
        let completion = adapter
            .complete(&[ChatMessage::system("persona"), ChatMessage::user("hi")], &params())
            .await
            .unwrap();
        assert_eq!(completion.text, "Hello");
        assert_eq!(completion.input_tokens, Some(7));
        assert_eq!(completion.output_tokens, Some(2));
    }

    #[tokio::test]
    async fn overloaded_maps_to_status_and_type() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(529).set_body_json(json!({
                "type": "error",
                "error": {"type": "overloaded_error", "message": "Overloaded"}
            })))
            .mount(&server)
            .await;

        let adapter =
            AnthropicAdapter::with_base_url("anthropic", "m", Some("test-token"), Some(&server.uri()));
        let err = adapter
            .complete(&[ChatMessage::user("hi")], &params())
            .await
            .unwrap_err();
        assert_eq!(err.status, Some(529));
        assert_eq!(err.code.as_deref(), Some("overloaded_error"));
        assert_eq!(err.backend, "anthropic");
    }

    #[tokio::test]
    async fn text_free_response_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": []})))
            .mount(&server)
            .await;

        let adapter =
            AnthropicAdapter::with_base_url("anthropic", "m", Some("test-token"), Some(&server.uri()));
        let err = adapter
            .complete(&[ChatMessage::user("hi")], &params())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::EmptyResponse);
    }

    #[tokio::test]
    async fn missing_key_is_reported() {
        let adapter = AnthropicAdapter::new("anthropic", "m", Some("   "));
        let err = adapter
            .complete(&[ChatMessage::user("hi")], &params())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::MissingCredential);
    }
}
