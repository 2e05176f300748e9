use super::types::{ChatMessage, CompletionParams, MessageRole, RawCompletion};
use crate::error::ProviderError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// Static capability flags of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BackendCapabilities {
    pub supports_system_role: bool,
    pub supports_json_mode: bool,
}

/// Pinned future returned by [`BackendAdapter::complete`].
pub type CompletionFuture<'a> =
    Pin<Box<dyn Future<Output = Result<RawCompletion, ProviderError>> + Send + 'a>>;

/// One text-generation provider.
///
/// Each adapter translates the provider's native request/response objects
/// into [`RawCompletion`] and its failures into [`ProviderError`], keeping the
/// HTTP status and provider error code for the retry classifier.
pub trait BackendAdapter: Send + Sync {
    /// Backend identifier as used by the registry (e.g. "openai").
    fn id(&self) -> &str;

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::default()
    }

    fn complete<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        params: &'a CompletionParams,
    ) -> CompletionFuture<'a>;
}

/// Split the leading system instruction(s) off a message list.
///
/// Every system-role message is concatenated into the returned instruction,
/// for backends that take the system prompt as a separate field.
pub fn split_system(messages: &[ChatMessage]) -> (Option<String>, Vec<&ChatMessage>) {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == MessageRole::System)
        .map(|m| m.content.as_str())
        .collect();
    let rest = messages
        .iter()
        .filter(|m| m.role != MessageRole::System)
        .collect();
    let system = if system.is_empty() {
        None
    } else {
        Some(system.join("\n\n"))
    };
    (system, rest)
}

/// Fold system messages into the first user turn, for backends without a
/// system role.
pub fn fold_system_into_user(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    let (system, rest) = split_system(messages);
    let mut folded: Vec<ChatMessage> = rest.into_iter().cloned().collect();
    let Some(system) = system else {
        return folded;
    };

    match folded.iter_mut().find(|m| m.role == MessageRole::User) {
        Some(first_user) => {
            first_user.content = format!("{system}\n\n{}", first_user.content);
        }
        None => folded.insert(0, ChatMessage::user(system)),
    }
    folded
}
