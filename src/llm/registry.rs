use super::traits::BackendCapabilities;
use serde::Serialize;
use std::collections::HashMap;

/// Read-only key/value lookup for backend credentials.
pub trait CredentialStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// Credentials from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentialStore;

impl CredentialStore for EnvCredentialStore {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Fixed in-memory credentials, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialStore {
    values: HashMap<String, String>,
}

impl StaticCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl CredentialStore for StaticCredentialStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Resolve the first non-blank credential among `keys`.
pub fn resolve_credential(keys: &[String], store: &dyn CredentialStore) -> Option<String> {
    keys.iter().find_map(|key| {
        store
            .get(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendDescriptor {
    pub id: String,
    pub available: bool,
    /// Lower values are tried first.
    pub priority: i32,
    pub capabilities: BackendCapabilities,
}

/// What the registry needs to probe one backend at startup.
#[derive(Debug, Clone)]
pub struct BackendSpec {
    pub id: String,
    pub priority: i32,
    pub capabilities: BackendCapabilities,
    /// Credential keys tried in order. Empty means no credential is needed.
    pub credential_keys: Vec<String>,
}

/// Which backends this process may use.
///
/// Written once at startup and never mutated, so it is shared across
/// concurrent requests behind an `Arc` without locking.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    descriptors: Vec<BackendDescriptor>,
}

impl ProviderRegistry {
    /// Build from already-probed descriptors. Ordering is by priority, ties
    /// keep registration order.
    pub fn from_descriptors(mut descriptors: Vec<BackendDescriptor>) -> Self {
        for descriptor in &mut descriptors {
            descriptor.id = descriptor.id.trim().to_ascii_lowercase();
        }
        descriptors.sort_by_key(|d| d.priority);
        Self { descriptors }
    }

    /// Probe every backend against the credential store once.
    pub fn probe(specs: &[BackendSpec], store: &dyn CredentialStore) -> Self {
        let descriptors = specs
            .iter()
            .map(|spec| {
                let available = spec.credential_keys.is_empty()
                    || resolve_credential(&spec.credential_keys, store).is_some();
                if !available {
                    tracing::warn!(
                        backend = spec.id.as_str(),
                        "No credential found, backend excluded"
                    );
                }
                BackendDescriptor {
                    id: spec.id.clone(),
                    available,
                    priority: spec.priority,
                    capabilities: spec.capabilities,
                }
            })
            .collect();
        Self::from_descriptors(descriptors)
    }

    pub fn is_available(&self, backend_id: &str) -> bool {
        self.descriptor(backend_id).is_some_and(|d| d.available)
    }

    pub fn descriptor(&self, backend_id: &str) -> Option<&BackendDescriptor> {
        let wanted = backend_id.trim();
        self.descriptors
            .iter()
            .find(|d| d.id.eq_ignore_ascii_case(wanted))
    }

    /// Available backends in priority order.
    pub fn list_available(&self) -> Vec<BackendDescriptor> {
        self.descriptors
            .iter()
            .filter(|d| d.available)
            .cloned()
            .collect()
    }

    /// Every registered backend, including unavailable ones.
    pub fn all(&self) -> &[BackendDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
