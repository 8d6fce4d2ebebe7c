//! The core state machine: folds the ordered event stream into a message.
//!
//! `fold` is a pure reducer over `(Message, StreamEvent)`. Every call
//! returns the next frame of the message; nothing else mutates a message
//! after creation. Per-message states run `Empty -> Thinking ->
//! (Responding | ToolPhase) -> Sealed`, with tool invocations orthogonal
//! to the thinking/text axis.

mod tracker;

pub use tracker::{ToolCallTracker, ToolPatch};

use tracing::{trace, warn};

use crate::message::{ContentBlock, Message, StreamFault, ToolStatus};
use crate::types::{StreamEvent, ToolEndStatus};

/// Status given to an invocation whose stream ends before its `tool_end`
/// arrives, whether by cancellation, error, or a premature `message_end`.
/// Pinned as a constant so tests and the UI agree on the policy.
pub const CANCELLED_TOOL_STATUS: ToolStatus = ToolStatus::Failed;

/// Apply one event to the prior message state, producing the next state.
///
/// Events folded into a sealed message are discarded: cancellation or an
/// error already closed the message, and a terminal frame must stay
/// terminal.
pub fn fold(mut message: Message, event: StreamEvent) -> Message {
    if message.is_sealed() {
        warn!(message_id = %message.id, ?event, "event after seal discarded");
        return message;
    }

    match event {
        // The message value already exists by the time any event is
        // observed; message_start only marks stream existence.
        StreamEvent::MessageStart => {}
        StreamEvent::ThinkingDelta { text } => apply_thinking_delta(&mut message, &text),
        StreamEvent::TextDelta { text } => apply_text_delta(&mut message, &text),
        StreamEvent::ToolStart { id, name, input } => {
            let mut tracker = ToolCallTracker::for_blocks(&message.blocks);
            let patch = if tracker.contains(&id) {
                // Duplicate start: treat as a patch, never a second entry.
                warn!(tool_id = %id, "duplicate tool_start treated as patch");
                ToolPatch {
                    name: Some(name),
                    input: Some(input),
                    ..ToolPatch::default()
                }
            } else {
                ToolPatch {
                    name: Some(name),
                    input: Some(input),
                    status: Some(ToolStatus::Pending),
                    ..ToolPatch::default()
                }
            };
            tracker.upsert(&mut message.blocks, &id, patch);
        }
        StreamEvent::ToolResultDelta { id, chunk } => {
            let mut tracker = ToolCallTracker::for_blocks(&message.blocks);
            let already_terminal = tracker
                .get(&message.blocks, &id)
                .is_some_and(|call| call.status.is_terminal());
            // A delta normally marks the call running; once terminal the
            // status is immutable and only the late text concatenates.
            let patch = ToolPatch {
                status: (!already_terminal).then_some(ToolStatus::Running),
                append_result: Some(chunk),
                ..ToolPatch::default()
            };
            tracker.upsert(&mut message.blocks, &id, patch);
        }
        StreamEvent::ToolEnd { id, status } => {
            let mut tracker = ToolCallTracker::for_blocks(&message.blocks);
            if tracker
                .get(&message.blocks, &id)
                .is_some_and(|call| call.status.is_terminal())
            {
                warn!(tool_id = %id, "tool_end for already-terminal invocation discarded");
            } else {
                let terminal = match status {
                    ToolEndStatus::Completed => ToolStatus::Completed,
                    ToolEndStatus::Failed => ToolStatus::Failed,
                };
                tracker.upsert(
                    &mut message.blocks,
                    &id,
                    ToolPatch {
                        status: Some(terminal),
                        ..ToolPatch::default()
                    },
                );
            }
        }
        StreamEvent::MessageMetrics(metrics) => {
            message.metrics = Some(metrics);
        }
        StreamEvent::MessageEnd => seal(&mut message),
        StreamEvent::StreamError {
            reason,
            http_status,
        } => {
            message.fault = Some(StreamFault {
                reason,
                http_status,
            });
            seal(&mut message);
        }
        StreamEvent::Unknown => {
            trace!(message_id = %message.id, "unrecognized event ignored");
        }
    }

    message
}

/// Fold a whole event sequence in arrival order.
pub fn fold_all(message: Message, events: impl IntoIterator<Item = StreamEvent>) -> Message {
    events.into_iter().fold(message, fold)
}

/// Seal an in-flight message on client-initiated cancellation. Already
/// decoded but unfolded events must be discarded by the caller; nothing
/// folds after this. Cancellation is a valid terminal state, not an error.
pub fn seal_cancelled(mut message: Message) -> Message {
    if message.is_sealed() {
        return message;
    }
    message.cancelled = true;
    seal(&mut message);
    message
}

fn apply_thinking_delta(message: &mut Message, text: &str) {
    let text_began = message
        .blocks
        .iter()
        .any(|block| matches!(block, ContentBlock::Text { .. }));
    if text_began {
        // Appending now would either create a second thinking block or
        // reopen a closed one; both break the block invariants.
        warn!(message_id = %message.id, "thinking_delta after text began discarded");
        return;
    }

    for block in &mut message.blocks {
        if let ContentBlock::Thinking {
            text: existing, ..
        } = block
        {
            existing.push_str(text);
            return;
        }
    }
    message.blocks.push(ContentBlock::Thinking {
        text: text.to_string(),
        is_streaming: true,
    });
}

fn apply_text_delta(message: &mut Message, text: &str) {
    // Text beginning closes the thinking phase; the reasoning stays
    // visible, collapsed, above the answer.
    for block in &mut message.blocks {
        if let ContentBlock::Thinking { is_streaming, .. } = block {
            *is_streaming = false;
        }
    }

    for block in &mut message.blocks {
        if let ContentBlock::Text {
            text: existing, ..
        } = block
        {
            existing.push_str(text);
            return;
        }
    }
    message.blocks.push(ContentBlock::Text {
        text: text.to_string(),
        is_streaming: true,
    });
}

/// Close every still-open block and the message itself. The single code
/// path that flips `is_streaming`, so block and message flags cannot
/// drift apart.
fn seal(message: &mut Message) {
    for block in &mut message.blocks {
        match block {
            ContentBlock::Thinking { is_streaming, .. }
            | ContentBlock::Text { is_streaming, .. } => *is_streaming = false,
            ContentBlock::Tool(call) => {
                if !call.status.is_terminal() {
                    call.status = CANCELLED_TOOL_STATUS;
                }
            }
        }
    }
    message.is_streaming = false;
}
