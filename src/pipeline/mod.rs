//! Drives one conversation turn: relay bytes -> decoder -> fold.
//!
//! A single logical stream feeds a single in-flight assistant message.
//! Events fold strictly in arrival order and a `Message` snapshot goes
//! out after every fold, so consumers may throttle rendering but the
//! terminal frame is always delivered.

use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::assembler::{fold, seal_cancelled};
use crate::config::Config;
use crate::decode::{DecodeFormat, EventDecoder};
use crate::message::Message;
use crate::relay::{ByteStream, RelayClient, UpstreamStatusError};
use crate::types::{ChatRequest, ErrorReason, StreamEvent};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Longest gap between frames before the stream is declared hung.
    /// Local policy, not an upstream contract: a dead connection must
    /// not leave the UI on an indefinite spinner.
    pub idle_timeout: Duration,
    pub format: DecodeFormat,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30),
            format: DecodeFormat::EventStream,
        }
    }
}

impl From<&Config> for PipelineOptions {
    fn from(config: &Config) -> Self {
        Self {
            idle_timeout: config.idle_timeout,
            format: config.decode_format,
        }
    }
}

/// Open the upstream connection and assemble the whole turn.
///
/// A connection-level failure never yields a partial stream: the fresh
/// message is sealed with a single upstream fault and returned.
pub async fn run_chat(
    relay: &RelayClient,
    request: &ChatRequest,
    message_id: impl Into<String>,
    options: &PipelineOptions,
    updates: Option<&mpsc::UnboundedSender<Message>>,
    cancel: &CancellationToken,
) -> Message {
    let message = Message::assistant(message_id);
    match relay.open_stream(request).await {
        Ok(bytes) => run_stream(message, bytes, options, updates, cancel).await,
        Err(error) => {
            warn!(%error, "upstream connection failed");
            let http_status = error
                .downcast_ref::<UpstreamStatusError>()
                .map(|status| status.0);
            let sealed = fold(
                message,
                StreamEvent::StreamError {
                    reason: ErrorReason::Upstream,
                    http_status,
                },
            );
            emit(updates, &sealed);
            sealed
        }
    }
}

/// Fold an already-open byte stream into the given assistant message.
pub async fn run_stream(
    mut message: Message,
    mut bytes: ByteStream,
    options: &PipelineOptions,
    updates: Option<&mpsc::UnboundedSender<Message>>,
    cancel: &CancellationToken,
) -> Message {
    let mut decoder = EventDecoder::new(options.format);

    loop {
        if message.is_sealed() {
            return message;
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(message_id = %message.id, "turn cancelled");
                message = seal_cancelled(message);
                emit(updates, &message);
                return message;
            }
            next = timeout(options.idle_timeout, bytes.next()) => match next {
                Err(_elapsed) => {
                    warn!(message_id = %message.id, "idle window elapsed");
                    message = fold(message, StreamEvent::StreamError {
                        reason: ErrorReason::Timeout,
                        http_status: None,
                    });
                    emit(updates, &message);
                    return message;
                }
                Ok(Some(Ok(chunk))) => {
                    for event in decoder.feed(&chunk) {
                        if cancel.is_cancelled() {
                            // Decoded but not yet folded: discarded.
                            message = seal_cancelled(message);
                            emit(updates, &message);
                            return message;
                        }
                        message = fold(message, event);
                        emit(updates, &message);
                        if message.is_sealed() {
                            return message;
                        }
                    }
                }
                Ok(Some(Err(error))) => {
                    warn!(message_id = %message.id, %error, "transport error mid-stream");
                    let http_status = error
                        .downcast_ref::<UpstreamStatusError>()
                        .map(|status| status.0);
                    message = fold(message, StreamEvent::StreamError {
                        reason: ErrorReason::Upstream,
                        http_status,
                    });
                    emit(updates, &message);
                    return message;
                }
                Ok(None) => {
                    for event in decoder.finish() {
                        message = fold(message, event);
                        emit(updates, &message);
                        if message.is_sealed() {
                            return message;
                        }
                    }
                    // Exhausted without message_end: a mid-stream disconnect.
                    warn!(message_id = %message.id, "stream ended before message_end");
                    message = fold(message, StreamEvent::StreamError {
                        reason: ErrorReason::Upstream,
                        http_status: None,
                    });
                    emit(updates, &message);
                    return message;
                }
            }
        }
    }
}

fn emit(updates: Option<&mpsc::UnboundedSender<Message>>, message: &Message) {
    if let Some(tx) = updates {
        let _ = tx.send(message.clone());
    }
}
