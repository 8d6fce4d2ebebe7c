use serde::{Deserialize, Serialize};

/// One logically complete frame of the upstream event stream.
///
/// Events arrive totally ordered; the assembler never reorders them, it
/// only merges contiguous deltas of the same kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart,
    ThinkingDelta {
        text: String,
    },
    TextDelta {
        text: String,
    },
    ToolStart {
        id: String,
        name: String,
        #[serde(default = "default_json_object")]
        input: serde_json::Value,
    },
    ToolResultDelta {
        id: String,
        chunk: String,
    },
    ToolEnd {
        id: String,
        status: ToolEndStatus,
    },
    MessageMetrics(MessageMetrics),
    MessageEnd,
    StreamError {
        reason: ErrorReason,
        #[serde(rename = "httpStatus", default, skip_serializing_if = "Option::is_none")]
        http_status: Option<u16>,
    },
    /// Forward-compatibility: unrecognized event tags decode here and are
    /// ignored by the fold. Malformed JSON is a decode error instead.
    #[serde(other)]
    Unknown,
}

/// Terminal status reported by a `tool_end` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolEndStatus {
    Completed,
    Failed,
}

/// Why a stream ended abnormally. Cancellation is deliberately absent:
/// it is a distinct terminal state, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    /// A frame failed to decode; the rest of the stream is not trusted.
    Decode,
    /// Non-success response or mid-stream disconnect from upstream.
    Upstream,
    /// The local idle window elapsed without a frame.
    Timeout,
}

/// Usage metrics attached to a message by a `message_metrics` frame.
/// The wire contract spells these camelCase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetrics {
    pub duration_ms: u64,
    pub tokens: u64,
    pub cost_usd: f64,
}

/// Outbound payload forwarded to the upstream service. The `context`
/// schema belongs to the chat-request-building glue and is opaque here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

fn default_json_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}
