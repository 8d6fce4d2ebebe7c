//! Projection of an assembled message into a display model.
//!
//! `project` is referentially transparent: the same `Message` value
//! always yields the same `DisplayModel`, which keeps the UI layer
//! diffable and testable without any network machinery.

mod registry;

pub use registry::{ToolDisplayInfo, ToolDisplayRegistry};

use crate::message::{ContentBlock, Message, ToolStatus};
use crate::types::{ErrorReason, MessageMetrics};

/// Presentation toggle owned by the caller, not by the assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimelineView {
    /// Tools fold into a one-line "N steps · latest" summary.
    #[default]
    Collapsed,
    /// Every invocation appears inline in block order.
    Expanded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplayModel {
    /// True iff the message is streaming and nothing has arrived yet.
    pub show_thinking_placeholder: bool,
    pub blocks: Vec<DisplayBlock>,
    /// Collapsed-view summary line; `None` when expanded or toolless.
    pub tool_summary: Option<String>,
    pub metrics_line: Option<String>,
    /// Short inline notice for a stream that was cut off.
    pub error_notice: Option<String>,
    pub is_streaming: bool,
    pub cancelled: bool,
    /// Retry is offered only once the message is sealed by error or
    /// cancellation, never mid-stream and never after a clean finish.
    pub can_retry: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DisplayBlock {
    Thinking {
        text: String,
        streaming: bool,
    },
    Text {
        text: String,
        streaming: bool,
    },
    Tool {
        label: String,
        icon: String,
        status: ToolStatus,
        show_spinner: bool,
        result_preview: Option<String>,
    },
}

const RESULT_PREVIEW_MAX_CHARS: usize = 120;

/// Map the current message frame to what the UI should show.
pub fn project(
    message: &Message,
    registry: &ToolDisplayRegistry,
    view: TimelineView,
) -> DisplayModel {
    let mut blocks = Vec::new();
    let mut tool_count = 0usize;
    let mut latest_tool_label: Option<String> = None;

    for block in &message.blocks {
        match block {
            ContentBlock::Thinking { text, is_streaming } => blocks.push(DisplayBlock::Thinking {
                text: text.clone(),
                streaming: *is_streaming,
            }),
            ContentBlock::Text { text, is_streaming } => blocks.push(DisplayBlock::Text {
                text: text.clone(),
                streaming: *is_streaming,
            }),
            ContentBlock::Tool(call) => {
                let info = registry.lookup(&call.name);
                tool_count += 1;
                latest_tool_label = Some(info.label.clone());
                if view == TimelineView::Expanded {
                    blocks.push(DisplayBlock::Tool {
                        label: info.label.clone(),
                        icon: info.icon.clone(),
                        status: call.status,
                        show_spinner: !call.status.is_terminal(),
                        result_preview: result_preview(&call.result_text),
                    });
                }
            }
        }
    }

    let tool_summary = match (view, tool_count) {
        (TimelineView::Collapsed, n) if n > 0 => {
            let noun = if n == 1 { "step" } else { "steps" };
            latest_tool_label.map(|label| format!("{n} {noun} · {label}"))
        }
        _ => None,
    };

    DisplayModel {
        show_thinking_placeholder: message.blocks.is_empty() && message.is_streaming,
        blocks,
        tool_summary,
        metrics_line: message.metrics.as_ref().map(format_metrics),
        error_notice: message.fault.as_ref().map(|fault| match fault.reason {
            ErrorReason::Decode => "Response could not be decoded.".to_string(),
            ErrorReason::Upstream => match fault.http_status {
                Some(status) => format!("Connection to the assistant failed (HTTP {status})."),
                None => "Connection to the assistant was interrupted.".to_string(),
            },
            ErrorReason::Timeout => "The assistant stopped responding.".to_string(),
        }),
        is_streaming: message.is_streaming,
        cancelled: message.cancelled,
        can_retry: message.is_sealed() && (message.fault.is_some() || message.cancelled),
    }
}

fn result_preview(result_text: &str) -> Option<String> {
    let first_line = result_text.lines().next()?.trim();
    if first_line.is_empty() {
        return None;
    }
    let mut preview: String = first_line.chars().take(RESULT_PREVIEW_MAX_CHARS).collect();
    if first_line.chars().count() > RESULT_PREVIEW_MAX_CHARS || result_text.lines().count() > 1 {
        preview.push('…');
    }
    Some(preview)
}

fn format_metrics(metrics: &MessageMetrics) -> String {
    format!(
        "{:.1}s · {} tok · ${:.4}",
        metrics.duration_ms as f64 / 1000.0,
        metrics.tokens,
        metrics.cost_usd
    )
}
