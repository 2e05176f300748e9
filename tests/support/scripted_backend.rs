#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use genrelay::ProviderError;
use genrelay::llm::{
    BackendAdapter, BackendCapabilities, ChatMessage, CompletionFuture, CompletionParams,
    RawCompletion,
};

pub type Step = Result<RawCompletion, ProviderError>;

/// Backend stub that replays a fixed list of outcomes and records each call.
pub struct ScriptedBackend {
    id: String,
    capabilities: BackendCapabilities,
    script: Mutex<VecDeque<Step>>,
    hang: bool,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedBackend {
    pub fn new(id: &str, script: Vec<Step>) -> Arc<Self> {
        Arc::new(Self::build(id, script, false))
    }

    /// A backend whose calls never complete.
    pub fn hanging(id: &str) -> Arc<Self> {
        Arc::new(Self::build(id, Vec::new(), true))
    }

    pub fn without_system_role(id: &str, script: Vec<Step>) -> Arc<Self> {
        let mut backend = Self::build(id, script, false);
        backend.capabilities.supports_system_role = false;
        Arc::new(backend)
    }

    fn build(id: &str, script: Vec<Step>, hang: bool) -> Self {
        Self {
            id: id.to_string(),
            capabilities: BackendCapabilities {
                supports_system_role: true,
                supports_json_mode: false,
            },
            script: Mutex::new(script.into()),
            hang,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Messages passed to each call, in order.
    pub fn seen(&self) -> Vec<Vec<ChatMessage>> {
        self.seen.lock().unwrap().clone()
    }
}

impl BackendAdapter for ScriptedBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities
    }

    fn complete<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        _params: &'a CompletionParams,
    ) -> CompletionFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(messages.to_vec());
            if self.hang {
                std::future::pending::<()>().await;
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::other(&self.id, "script exhausted")))
        })
    }
}

pub fn ok(text: &str) -> Step {
    Ok(RawCompletion::text_only(text).with_usage(10, 5))
}

pub fn unavailable(id: &str) -> Step {
    Err(ProviderError::http(id, 503, None, "Service Unavailable"))
}

pub fn unauthorized(id: &str) -> Step {
    Err(ProviderError::http(
        id,
        401,
        Some("invalid_api_key".into()),
        "Incorrect API key provided",
    ))
}

/// Pair each backend with its priority in the shape the orchestrator takes.
pub fn lineup(entries: &[(i32, &Arc<ScriptedBackend>)]) -> Vec<(i32, Arc<dyn BackendAdapter>)> {
    entries
        .iter()
        .map(|(priority, backend)| (*priority, Arc::clone(*backend) as Arc<dyn BackendAdapter>))
        .collect()
}
