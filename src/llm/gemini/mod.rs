//! Google Gemini `generateContent`.

mod types;

use super::http_client::{build_provider_client, send_json};
use super::traits::{BackendAdapter, BackendCapabilities, CompletionFuture, split_system};
use super::types::{ChatMessage, CompletionParams, MessageRole, RawCompletion};
use crate::error::ProviderError;
use reqwest::Client;
use types::{
    Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, Part,
};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiAdapter {
    id: String,
    model: String,
    api_key: Option<String>,
    generate_url: String,
    capabilities: BackendCapabilities,
    client: Client,
}

fn text_content(role: Option<&str>, text: &str) -> Content {
    Content {
        role: role.map(ToString::to_string),
        parts: vec![Part {
            text: Some(text.to_string()),
        }],
    }
}

impl GeminiAdapter {
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
            .map_or(GEMINI_BASE_URL, |u| u.trim_end_matches('/'))
            .to_string();
        let model = model.trim_start_matches("models/");
        Self {
            id: id.to_string(),
            model: model.to_string(),
            api_key: api_key
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(ToString::to_string),
            generate_url: format!("{base}/v1beta/models/{model}:generateContent"),
            capabilities: Self::default_capabilities(),
            client: build_provider_client(),
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

    fn build_request(
        messages: &[ChatMessage],
        params: &CompletionParams,
    ) -> GenerateContentRequest {
        let (system, rest) = split_system(messages);
        let contents = rest
            .iter()
            .map(|m| {
                let role = match m.role {
                    MessageRole::Assistant => "model",
                    MessageRole::User | MessageRole::System => "user",
                };
                text_content(Some(role), &m.content)
            })
            .collect();
        GenerateContentRequest {
            contents,
            system_instruction: system.map(|s| text_content(None, &s)),
            generation_config: GenerationConfig {
                temperature: params.temperature,
                max_output_tokens: params.max_tokens,
                response_mime_type: params.json_mode.then_some("application/json"),
            },
        }
    }

    fn into_completion(
        &self,
        response: GenerateContentResponse,
    ) -> Result<RawCompletion, ProviderError> {
        let candidate = response.candidates.into_iter().next();
        let finish_reason = candidate.as_ref().and_then(|c| c.finish_reason.clone());
        let text = candidate
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            tracing::debug!(
                backend = self.id.as_str(),
                finish_reason = finish_reason.as_deref().unwrap_or("none"),
                "Gemini returned no text"
            );
            return Err(ProviderError::empty_response(&self.id));
        }

        let mut completion = RawCompletion::text_only(text)
            .with_model(response.model_version.unwrap_or_else(|| self.model.clone()));
        if let Some(usage) = response.usage_metadata {
            completion =
                completion.with_usage(usage.prompt_token_count, usage.candidates_token_count);
        }
        Ok(completion)
    }
}

impl BackendAdapter for GeminiAdapter {
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

            // Key goes in a header so it never shows up in logged URLs.
            let request = self
                .client
                .post(&self.generate_url)
                .header("x-goog-api-key", api_key)
                .json(&Self::build_request(messages, params));

            let response: GenerateContentResponse =
                send_json(&self.id, "Gemini", request).await?;
            self.into_completion(response)
        })
    }
}
