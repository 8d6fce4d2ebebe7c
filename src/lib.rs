//! Streaming chat response pipeline.
//!
//! Data flows one way: relay -> decoder -> assembler -> projection -> UI.
//! Cancellation and retry flow the opposite direction, back into the
//! relay. The UI layer itself lives outside this crate; it consumes the
//! [`project::DisplayModel`] and nothing else.

pub mod assembler;
pub mod config;
pub mod decode;
pub mod message;
pub mod pipeline;
pub mod project;
pub mod relay;
pub mod state;
pub mod types;

pub use assembler::{fold, fold_all, seal_cancelled, CANCELLED_TOOL_STATUS};
pub use config::Config;
pub use decode::{DecodeFormat, EventDecoder};
pub use message::{ContentBlock, Message, Role, StreamFault, ToolInvocation, ToolStatus};
pub use pipeline::{run_chat, run_stream, PipelineOptions};
pub use project::{project, DisplayModel, TimelineView, ToolDisplayRegistry};
pub use relay::{ByteStream, RelayClient};
pub use state::Conversation;
pub use types::{ChatRequest, ErrorReason, MessageMetrics, StreamEvent, ToolEndStatus};
