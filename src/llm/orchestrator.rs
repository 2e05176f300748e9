use super::clock::Clock;
use super::engine::ExecutionEngine;
use super::factory::build_backends;
use super::prompt::{ContextBudget, assemble};
use super::registry::{BackendDescriptor, CredentialStore, ProviderRegistry};
use super::retry::{DefaultClassifier, RetryPolicy};
use super::router::route;
use super::traits::BackendAdapter;
use super::types::{GenerationParams, GenerationRequest, GenerationResult};
use crate::config::Config;
use crate::error::GenerationError;
use crate::observability::{LogObserver, Observer};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Entry point for callers: one request in, one result or aggregated failure
/// out.
///
/// Holds only read-only state, so one instance can serve concurrent requests
/// behind an `Arc`.
pub struct Orchestrator {
    registry: ProviderRegistry,
    engine: ExecutionEngine,
    defaults: GenerationParams,
    default_backend: Option<String>,
    budget: ContextBudget,
}

impl Orchestrator {
    pub fn new(registry: ProviderRegistry, engine: ExecutionEngine) -> Self {
        Self {
            registry,
            engine,
            defaults: GenerationParams::default(),
            default_backend: None,
            budget: ContextBudget::unbounded(),
        }
    }

    /// Probe credentials and build every configured backend.
    pub fn from_config(config: &Config, store: &dyn CredentialStore) -> Self {
        let (registry, adapters) = build_backends(config, store);
        let engine = ExecutionEngine::new(adapters)
            .with_policy(RetryPolicy::from_config(&config.reliability))
            .with_classifier(Arc::new(DefaultClassifier::from_config(&config.reliability)))
            .with_observer(Arc::new(LogObserver::new()));

        tracing::info!(
            available = registry.list_available().len(),
            configured = registry.len(),
            "Generation backends ready"
        );

        Self {
            registry,
            engine,
            defaults: GenerationParams {
                temperature: config.generation.temperature,
                max_tokens: config.generation.max_tokens,
                ..GenerationParams::default()
            },
            default_backend: config
                .default_backend
                .as_deref()
                .map(|b| b.trim().to_ascii_lowercase()),
            budget: ContextBudget {
                max_chars: config.context.max_chars,
            },
        }
    }

    /// Shorthand for a registry built from the given adapters, all available.
    pub fn with_adapters(adapters: Vec<(i32, Arc<dyn BackendAdapter>)>) -> Self {
        let descriptors = adapters
            .iter()
            .map(|(priority, adapter)| BackendDescriptor {
                id: adapter.id().to_string(),
                available: true,
                priority: *priority,
                capabilities: adapter.capabilities(),
            })
            .collect();
        let engine = ExecutionEngine::new(adapters.into_iter().map(|(_, adapter)| adapter));
        Self::new(ProviderRegistry::from_descriptors(descriptors), engine)
    }

    pub fn with_engine(mut self, configure: impl FnOnce(ExecutionEngine) -> ExecutionEngine) -> Self {
        self.engine = configure(self.engine);
        self
    }

    pub fn with_policy(self, policy: RetryPolicy) -> Self {
        self.with_engine(|engine| engine.with_policy(policy))
    }

    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        self.with_engine(|engine| engine.with_clock(clock))
    }

    pub fn with_observer(self, observer: Arc<dyn Observer>) -> Self {
        self.with_engine(|engine| engine.with_observer(observer))
    }

    pub fn with_defaults(mut self, defaults: GenerationParams) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_default_backend(mut self, backend: impl Into<String>) -> Self {
        self.default_backend = Some(backend.into().trim().to_ascii_lowercase());
        self
    }

    pub fn with_budget(mut self, budget: ContextBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    /// Backends this request would try, in order.
    pub fn trial_order(&self, request: &GenerationRequest) -> Vec<String> {
        let preferred = request
            .preferred_backend()
            .or(self.default_backend.as_deref());
        route(preferred, &self.registry.list_available())
    }

    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, GenerationError> {
        self.run(request, None).await
    }

    /// Like [`generate`](Self::generate), aborting when `cancel` fires.
    pub async fn generate_with_cancel(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, GenerationError> {
        self.run(request, Some(cancel)).await
    }

    async fn run(
        &self,
        request: &GenerationRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<GenerationResult, GenerationError> {
        let trial_order = self.trial_order(request);
        let messages = assemble(request, self.budget);
        let params = GenerationParams {
            temperature: request.temperature().unwrap_or(self.defaults.temperature),
            max_tokens: request.max_tokens().unwrap_or(self.defaults.max_tokens),
            shape: request.response_shape().clone(),
        };
        tracing::debug!(
            backends = ?trial_order,
            messages = messages.len(),
            "Dispatching generation request"
        );
        self.engine
            .execute(&messages, &trial_order, &params, cancel)
            .await
    }
}
