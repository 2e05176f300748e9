use super::types::{ChatMessage, GenerationRequest, MessageList, MessageRole};

/// Upper bound on the assembled context, measured in characters of content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextBudget {
    pub max_chars: Option<usize>,
}

impl ContextBudget {
    pub const fn unbounded() -> Self {
        Self { max_chars: None }
    }

    pub const fn chars(max_chars: usize) -> Self {
        Self {
            max_chars: Some(max_chars),
        }
    }

    fn allows(self, size: usize) -> bool {
        self.max_chars.is_none_or(|max| size <= max)
    }
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Build the message sequence for one request.
///
/// Layout is system prompt, history in order, then the new user message.
/// When the total exceeds `budget`, the oldest history messages go first.
/// System messages and the new user message always survive, so the result
/// can still exceed the budget when nothing droppable is left.
pub fn assemble(request: &GenerationRequest, budget: ContextBudget) -> MessageList {
    let system = (!request.system_prompt().is_empty())
        .then(|| ChatMessage::system(request.system_prompt()));
    let mut history: Vec<ChatMessage> = request
        .history()
        .iter()
        .map(|turn| ChatMessage::new(MessageRole::from_loose(&turn.role), turn.content.clone()))
        .collect();
    let user = ChatMessage::user(request.user_message());

    let mut total = system.as_ref().map_or(0, ChatMessage::size)
        + history.iter().map(ChatMessage::size).sum::<usize>()
        + user.size();

    let mut dropped = 0;
    while !budget.allows(total) {
        let Some(index) = history.iter().position(|m| m.role != MessageRole::System) else {
            break;
        };
        total -= history.remove(index).size();
        dropped += 1;
    }

    if dropped > 0 {
        tracing::debug!(
            dropped,
            remaining_chars = total,
            "Dropped oldest history to fit context budget"
        );
    }

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.extend(system);
    messages.extend(history);
    messages.push(user);
    MessageList::with_dropped(messages, dropped)
}
