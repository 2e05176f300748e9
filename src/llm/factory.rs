use super::anthropic::AnthropicAdapter;
use super::gemini::GeminiAdapter;
use super::openai::OpenAiAdapter;
use super::registry::{BackendSpec, CredentialStore, ProviderRegistry, resolve_credential};
use super::traits::{BackendAdapter, BackendCapabilities};
use crate::config::{BackendConfig, BackendKind, Config};
use std::sync::Arc;

pub fn default_capabilities(kind: BackendKind) -> BackendCapabilities {
    match kind {
        BackendKind::OpenAi | BackendKind::OpenAiCompatible => OpenAiAdapter::default_capabilities(),
        BackendKind::Anthropic => AnthropicAdapter::default_capabilities(),
        BackendKind::Gemini => GeminiAdapter::default_capabilities(),
    }
}

/// Kind defaults with the per-backend overrides from config applied.
pub fn effective_capabilities(backend: &BackendConfig) -> BackendCapabilities {
    let defaults = default_capabilities(backend.kind);
    BackendCapabilities {
        supports_system_role: backend
            .supports_system_role
            .unwrap_or(defaults.supports_system_role),
        supports_json_mode: backend
            .supports_json_mode
            .unwrap_or(defaults.supports_json_mode),
    }
}

pub fn backend_spec(backend: &BackendConfig) -> BackendSpec {
    BackendSpec {
        id: backend.id.trim().to_ascii_lowercase(),
        priority: backend.priority,
        capabilities: effective_capabilities(backend),
        credential_keys: backend.credential_keys(),
    }
}

/// Create the adapter for one configured backend.
pub fn create_adapter(backend: &BackendConfig, api_key: Option<&str>) -> Arc<dyn BackendAdapter> {
    let id = backend.id.trim().to_ascii_lowercase();
    let base_url = backend.base_url.as_deref();
    let capabilities = effective_capabilities(backend);
    match backend.kind {
        BackendKind::OpenAi => Arc::new(
            OpenAiAdapter::with_base_url(&id, &backend.model, api_key, base_url)
                .with_capabilities(capabilities),
        ),
        BackendKind::OpenAiCompatible => Arc::new(
            OpenAiAdapter::compatible(&id, &backend.model, api_key, base_url.unwrap_or_default())
                .with_capabilities(capabilities),
        ),
        BackendKind::Anthropic => Arc::new(
            AnthropicAdapter::with_base_url(&id, &backend.model, api_key, base_url)
                .with_capabilities(capabilities),
        ),
        BackendKind::Gemini => Arc::new(
            GeminiAdapter::with_base_url(&id, &backend.model, api_key, base_url)
                .with_capabilities(capabilities),
        ),
    }
}

/// Probe credentials once and build the registry plus one adapter per
/// available backend.
pub fn build_backends(
    config: &Config,
    store: &dyn CredentialStore,
) -> (ProviderRegistry, Vec<Arc<dyn BackendAdapter>>) {
    let specs: Vec<BackendSpec> = config.backends.iter().map(backend_spec).collect();
    let registry = ProviderRegistry::probe(&specs, store);

    let adapters = config
        .backends
        .iter()
        .zip(&specs)
        .filter(|(_, spec)| registry.is_available(&spec.id))
        .map(|(backend, spec)| {
            let api_key = resolve_credential(&spec.credential_keys, store);
            tracing::debug!(
                backend = spec.id.as_str(),
                kind = backend.kind.as_str(),
                model = backend.model.as_str(),
                "Backend configured"
            );
            create_adapter(backend, api_key.as_deref())
        })
        .collect();
    (registry, adapters)
}
