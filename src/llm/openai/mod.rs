//! OpenAI chat completions, also used for OpenAI-compatible servers.

mod types;

use super::http_client::{build_provider_client, send_json};
use super::traits::{BackendAdapter, BackendCapabilities, CompletionFuture};
use super::types::{ChatMessage, CompletionParams, RawCompletion};
use crate::error::ProviderError;
use reqwest::Client;
use types::{ChatRequest, ChatResponse, Message, ResponseFormat};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiAdapter {
    id: String,
    display_name: String,
    model: String,
    api_key: Option<String>,
    /// Whether calls without a key fail up front.
    key_required: bool,
    chat_url: String,
    capabilities: BackendCapabilities,
    client: Client,
}

impl OpenAiAdapter {
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
            .map_or(OPENAI_BASE_URL, |u| u.trim_end_matches('/'))
            .to_string();
        Self {
            id: id.to_string(),
            display_name: "OpenAI".to_string(),
            model: model.to_string(),
            api_key: api_key
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(ToString::to_string),
            key_required: true,
            chat_url: format!("{base}/chat/completions"),
            capabilities: Self::default_capabilities(),
            client: build_provider_client(),
        }
    }

    /// A self-hosted or third-party server speaking the OpenAI protocol.
    /// The key is optional.
    pub fn compatible(id: &str, model: &str, api_key: Option<&str>, base_url: &str) -> Self {
        Self {
            display_name: id.to_string(),
            key_required: false,
            ..Self::with_base_url(id, model, api_key, Some(base_url))
        }
    }

    pub fn default_capabilities() -> BackendCapabilities {
        BackendCapabilities {
            supports_system_role: true,
            supports_json_mode: true,
        }
    }

    pub fn with_capabilities(mut self, capabilities: BackendCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn build_request(&self, messages: &[ChatMessage], params: &CompletionParams) -> ChatRequest {
        // json_object mode is rejected unless some message mentions JSON.
        let mentions_json = messages
            .iter()
            .any(|m| m.content.to_ascii_lowercase().contains("json"));
        ChatRequest {
            model: self.model.clone(),
            messages: messages
                .iter()
                .map(|m| Message {
                    role: m.role.as_str(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            response_format: (params.json_mode && mentions_json).then_some(ResponseFormat {
                kind: "json_object",
            }),
        }
    }

    fn into_completion(&self, response: ChatResponse) -> Result<RawCompletion, ProviderError> {
        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ProviderError::empty_response(&self.id))?;

        let mut completion = RawCompletion::text_only(text)
            .with_model(response.model.unwrap_or_else(|| self.model.clone()));
        if let Some(usage) = response.usage {
            completion = completion.with_usage(usage.prompt_tokens, usage.completion_tokens);
        }
        Ok(completion)
    }
}

impl BackendAdapter for OpenAiAdapter {
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
            let mut request = self
                .client
                .post(&self.chat_url)
                .json(&self.build_request(messages, params));
            match &self.api_key {
                Some(key) => request = request.bearer_auth(key),
                None if self.key_required => {
                    return Err(ProviderError::missing_credential(&self.id));
                }
                None => {}
            }

            let response: ChatResponse = send_json(&self.id, &self.display_name, request).await?;
            self.into_completion(response)
        })
    }
}
