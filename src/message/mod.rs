use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::types::{ErrorReason, MessageMetrics};

/// A typed, ordered unit of assistant output.
///
/// Block order is append-only: deltas of the same kind concatenate into
/// the existing block; new kinds append at the tail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Assistant reasoning. At most one per message, always first when present.
    Thinking { text: String, is_streaming: bool },
    /// The authoritative response body. At most one per message.
    Text { text: String, is_streaming: bool },
    /// A tool invocation, ordered by first-seen time.
    Tool(ToolInvocation),
}

impl ContentBlock {
    /// Whether this block is still receiving data. For tool blocks the
    /// notion is derived from lifecycle status, not a separate flag.
    pub fn is_streaming(&self) -> bool {
        match self {
            ContentBlock::Thinking { is_streaming, .. }
            | ContentBlock::Text { is_streaming, .. } => *is_streaming,
            ContentBlock::Tool(call) => !call.status.is_terminal(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
    pub status: ToolStatus,
    /// Concatenated `tool_result_delta` chunks. Stays empty when the
    /// upstream ends a call without ever streaming a result.
    pub result_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ToolStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ToolStatus::Completed | ToolStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// Terminal error annotation on a sealed message. Lets the UI tell
/// "finished normally" from "cut off" without unwinding the render tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFault {
    pub reason: ErrorReason,
    pub http_status: Option<u16>,
}

/// One chat message. User messages are leaves; an assistant message is
/// the target of event folding until it seals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub blocks: Vec<ContentBlock>,
    pub is_streaming: bool,
    pub metrics: Option<MessageMetrics>,
    pub fault: Option<StreamFault>,
    /// Cancellation is a valid terminal state, not an error.
    pub cancelled: bool,
    pub created_at: SystemTime,
}

impl Message {
    /// A user message: one literal text block, never streamed.
    pub fn user(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::User,
            blocks: vec![ContentBlock::Text {
                text: text.into(),
                is_streaming: false,
            }],
            is_streaming: false,
            metrics: None,
            fault: None,
            cancelled: false,
            created_at: SystemTime::now(),
        }
    }

    /// An empty assistant message, created the instant a stream begins.
    pub fn assistant(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            blocks: Vec::new(),
            is_streaming: true,
            metrics: None,
            fault: None,
            cancelled: false,
            created_at: SystemTime::now(),
        }
    }

    pub fn is_sealed(&self) -> bool {
        !self.is_streaming
    }

    pub fn thinking_text(&self) -> Option<&str> {
        self.blocks.iter().find_map(|block| match block {
            ContentBlock::Thinking { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn body_text(&self) -> Option<&str> {
        self.blocks.iter().find_map(|block| match block {
            ContentBlock::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Tool invocations in first-seen order.
    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolInvocation> {
        self.blocks.iter().filter_map(|block| match block {
            ContentBlock::Tool(call) => Some(call),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_is_a_sealed_leaf() {
        let msg = Message::user("u1", "show weekly actives");
        assert!(msg.is_sealed());
        assert_eq!(msg.body_text(), Some("show weekly actives"));
        assert!(msg.blocks.iter().all(|b| !b.is_streaming()));
    }

    #[test]
    fn test_tool_block_streaming_derives_from_status() {
        let mut call = ToolInvocation {
            id: "t1".to_string(),
            name: "query".to_string(),
            input: serde_json::json!({}),
            status: ToolStatus::Running,
            result_text: String::new(),
        };
        assert!(ContentBlock::Tool(call.clone()).is_streaming());

        call.status = ToolStatus::Failed;
        assert!(!ContentBlock::Tool(call).is_streaming());
    }

    #[test]
    fn test_block_serialization_round_trip() {
        let block = ContentBlock::Thinking {
            text: "comparing cohorts".to_string(),
            is_streaming: true,
        };
        let json = serde_json::to_string(&block).expect("serialize");
        let parsed: ContentBlock = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed, block);
    }
}
