//! Conversation-related types.

use stepwise_model::{ModelMessage, Role};

/// Storage for the messages of one conversation.
///
/// The agent only appends and takes snapshots. Whether (and how) older
/// messages get evicted is entirely up to the store.
pub trait MemoryStore: Send + Sync {
    /// Appends a message to the end of the log.
    fn append(&mut self, msg: ModelMessage);

    /// Returns the current log, oldest first.
    fn snapshot(&self) -> Vec<ModelMessage>;

    /// Returns `true` if the log currently holds `msg`.
    fn contains(&self, msg: &ModelMessage) -> bool {
        self.snapshot().contains(msg)
    }
}

/// An in-memory conversation log.
///
/// By default nothing is ever evicted. With [`Conversation::with_max_messages`]
/// the log is kept to a fixed window: system messages always stay, and the
/// oldest other turns are dropped first. An assistant message is dropped
/// together with all of its tool results, so the log never starts with an
/// orphaned tool result. The latest turn is never split, which can keep the
/// log above the limit until the next message arrives.
#[derive(Clone, Default, Debug)]
pub struct Conversation {
    items: Vec<ModelMessage>,
    max_messages: Option<usize>,
}

impl Conversation {
    /// Creates a conversation holding at most `max` messages.
    #[inline]
    pub fn with_max_messages(max: usize) -> Self {
        Self {
            items: vec![],
            max_messages: Some(max),
        }
    }

    /// Returns the messages in this conversation.
    #[inline]
    pub fn items(&self) -> &[ModelMessage] {
        &self.items
    }

    fn trim(&mut self) {
        let Some(max) = self.max_messages else {
            return;
        };
        while self.items.len() > max {
            let Some(start) =
                self.items.iter().position(|m| m.role() != Role::System)
            else {
                break;
            };
            // A turn is a message and the tool results that follow it.
            let end = self.items[start + 1..]
                .iter()
                .position(|m| m.role() != Role::Tool)
                .map_or(self.items.len(), |offset| start + 1 + offset);
            // The latest turn always survives, even over the limit.
            if end >= self.items.len() {
                break;
            }
            self.items.drain(start..end);
        }
    }
}

impl MemoryStore for Conversation {
    fn append(&mut self, msg: ModelMessage) {
        self.items.push(msg);
        self.trim();
    }

    #[inline]
    fn snapshot(&self) -> Vec<ModelMessage> {
        self.items.clone()
    }

    #[inline]
    fn contains(&self, msg: &ModelMessage) -> bool {
        self.items.contains(msg)
    }
}

#[cfg(test)]
mod tests {
    use stepwise_model::{AssistantMessage, ToolCallRequest, ToolCallResult};

    use super::*;

    #[test]
    fn test_unbounded_keeps_everything() {
        let mut conversation = Conversation::default();
        for i in 0..100 {
            conversation.append(ModelMessage::user(format!("msg {i}")));
        }
        assert_eq!(conversation.snapshot().len(), 100);
    }

    #[test]
    fn test_window_keeps_system_and_drops_orphans() {
        let mut conversation = Conversation::with_max_messages(3);
        conversation.append(ModelMessage::system("Be brief."));
        conversation.append(ModelMessage::Assistant(AssistantMessage {
            content: String::new(),
            tool_calls: vec![ToolCallRequest {
                id: "1".to_owned(),
                name: "glob".to_owned(),
                arguments: Default::default(),
            }],
        }));
        conversation.append(ModelMessage::Tool(ToolCallResult {
            id: "1".to_owned(),
            name: "glob".to_owned(),
            content: "a.rs".to_owned(),
        }));
        conversation.append(ModelMessage::user("And now?"));

        let items = conversation.items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].role(), Role::System);
        assert_eq!(items[1], ModelMessage::user("And now?"));
    }

    fn tool_batch(ids: &[&str]) -> Vec<ModelMessage> {
        let calls = ids
            .iter()
            .map(|id| ToolCallRequest {
                id: id.to_string(),
                name: "glob".to_owned(),
                arguments: Default::default(),
            })
            .collect();
        let mut messages = vec![ModelMessage::Assistant(AssistantMessage {
            content: String::new(),
            tool_calls: calls,
        })];
        messages.extend(ids.iter().map(|id| {
            ModelMessage::Tool(ToolCallResult {
                id: id.to_string(),
                name: "glob".to_owned(),
                content: format!("result {id}"),
            })
        }));
        messages
    }

    #[test]
    fn test_window_never_splits_a_tool_batch() {
        let mut conversation = Conversation::with_max_messages(3);
        conversation.append(ModelMessage::system("Be brief."));
        conversation.append(ModelMessage::user("Find files"));
        for msg in tool_batch(&["1", "2"]) {
            conversation.append(msg);
        }

        let roles: Vec<_> =
            conversation.items().iter().map(ModelMessage::role).collect();
        assert_eq!(
            roles,
            [Role::System, Role::Assistant, Role::Tool, Role::Tool]
        );

        conversation.append(ModelMessage::assistant("Found two."));
        assert_eq!(
            conversation.items(),
            [
                ModelMessage::system("Be brief."),
                ModelMessage::assistant("Found two."),
            ]
        );
    }
}
