use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The role tag of a [`ModelMessage`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// Input from the user.
    User,
    /// A reply from the model.
    Assistant,
    /// The result of a tool call.
    Tool,
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        f.write_str(s)
    }
}

/// A complete message in a conversation.
///
/// Serialized with an inline `role` tag, e.g.
/// `{"role": "user", "content": "Hi"}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ModelMessage {
    /// The system instructions.
    System {
        /// The instruction text.
        content: String,
    },
    /// A user input text.
    User {
        /// The input text.
        content: String,
    },
    /// A reply from the model, possibly requesting tool calls.
    Assistant(AssistantMessage),
    /// A tool call result.
    Tool(ToolCallResult),
}

impl ModelMessage {
    /// Creates a system message.
    #[inline]
    pub fn system<S: Into<String>>(content: S) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    /// Creates a user message.
    #[inline]
    pub fn user<S: Into<String>>(content: S) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    /// Creates a plain-text assistant message without tool calls.
    #[inline]
    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self::Assistant(AssistantMessage::text(content))
    }

    /// Returns the role tag of this message.
    #[inline]
    pub fn role(&self) -> Role {
        match self {
            ModelMessage::System { .. } => Role::System,
            ModelMessage::User { .. } => Role::User,
            ModelMessage::Assistant(_) => Role::Assistant,
            ModelMessage::Tool(_) => Role::Tool,
        }
    }

    /// Returns the textual content of this message.
    #[inline]
    pub fn content(&self) -> &str {
        match self {
            ModelMessage::System { content }
            | ModelMessage::User { content } => content,
            ModelMessage::Assistant(msg) => &msg.content,
            ModelMessage::Tool(result) => &result.content,
        }
    }
}

/// A reply from the model.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssistantMessage {
    /// The text the model generated. May be empty when the model only
    /// requested tool calls.
    #[serde(default)]
    pub content: String,
    /// Tool calls requested by the model, in the order the model
    /// emitted them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
}

impl AssistantMessage {
    /// Creates a text-only reply.
    #[inline]
    pub fn text<S: Into<String>>(content: S) -> Self {
        Self {
            content: content.into(),
            tool_calls: vec![],
        }
    }

    /// Returns `true` if the model asked for at least one tool call.
    #[inline]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Describes a tool call request from the model.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// The unique identifier for the tool call request.
    pub id: String,
    /// The name of the tool to call.
    pub name: String,
    /// The arguments to pass to the tool, as a JSON object mapping
    /// argument names to values.
    pub arguments: Value,
}

/// The result of calling a tool.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// The identifier of the tool call request this result answers.
    pub id: String,
    /// The name of the tool that was requested.
    pub name: String,
    /// The result of the tool call.
    pub content: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_role_tagged_serialization() {
        let msg = ModelMessage::user("Hi");
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({ "role": "user", "content": "Hi" })
        );

        let msg: ModelMessage = serde_json::from_value(json!({
            "role": "tool",
            "id": "call_1",
            "name": "glob",
            "content": "a.rs"
        }))
        .unwrap();
        assert_eq!(msg.role(), Role::Tool);
        assert_eq!(msg.content(), "a.rs");
    }

    #[test]
    fn test_assistant_defaults() {
        let msg: ModelMessage =
            serde_json::from_value(json!({ "role": "assistant" })).unwrap();
        let ModelMessage::Assistant(reply) = msg else {
            panic!("expected an assistant message");
        };
        assert!(reply.content.is_empty());
        assert!(!reply.has_tool_calls());
    }
}
