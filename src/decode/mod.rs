//! Incremental framing of the upstream byte stream into typed events.
//!
//! Chunks arrive at arbitrary granularity; a frame may straddle two
//! network reads. The decoder buffers until a frame terminator is seen
//! and never emits a partial event. A malformed frame yields exactly one
//! `StreamError { reason: Decode }` after which the decoder is poisoned
//! and drops all further input: a half-decoded stream is not trustworthy.

use tracing::trace;

use crate::types::{ErrorReason, StreamEvent};

/// How the deployment frames events on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeFormat {
    /// `text/event-stream`: `data:` lines terminated by a blank line.
    #[default]
    EventStream,
    /// One JSON object per newline-terminated line.
    JsonLines,
}

#[derive(Debug, Default)]
pub struct EventDecoder {
    format: DecodeFormat,
    // Raw bytes, decoded to text only per complete frame: a read boundary
    // may fall inside a multi-byte character, a frame boundary cannot.
    buffer: Vec<u8>,
    poisoned: bool,
}

impl EventDecoder {
    pub fn new(format: DecodeFormat) -> Self {
        Self {
            format,
            buffer: Vec::new(),
            poisoned: false,
        }
    }

    /// True once a decode error has been emitted; all later input is dropped.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Consume one network read and return every event completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        if self.poisoned {
            return Vec::new();
        }
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let terminator: &[u8] = match self.format {
            DecodeFormat::EventStream => b"\n\n",
            DecodeFormat::JsonLines => b"\n",
        };

        let mut start = 0;
        while let Some(end) = find_terminator(&self.buffer[start..], terminator) {
            let frame_end = start + end + terminator.len();
            let frame = String::from_utf8_lossy(&self.buffer[start..frame_end]).into_owned();
            start = frame_end;

            match self.decode_frame(&frame) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(error) => {
                    trace!(%error, frame = %frame.trim(), "undecodable frame, poisoning decoder");
                    events.push(decode_error());
                    self.poison();
                    return events;
                }
            }
        }

        if start > 0 {
            self.buffer.drain(..start);
        }
        events
    }

    /// Drain a final unterminated frame when the connection closes.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.poisoned {
            return Vec::new();
        }
        let trailing = String::from_utf8_lossy(&std::mem::take(&mut self.buffer)).into_owned();
        if trailing.trim().is_empty() {
            return Vec::new();
        }
        match self.decode_frame(&trailing) {
            Ok(Some(event)) => vec![event],
            Ok(None) => Vec::new(),
            Err(_) => {
                trace!(frame = %trailing.trim(), "undecodable trailing frame");
                self.poison();
                vec![decode_error()]
            }
        }
    }

    fn poison(&mut self) {
        self.poisoned = true;
        self.buffer.clear();
    }

    /// Decode one complete frame. `Ok(None)` means the frame carried no
    /// event (keepalive comment, `[DONE]` sentinel, bare metadata lines).
    fn decode_frame(&self, frame: &str) -> Result<Option<StreamEvent>, serde_json::Error> {
        let payload = match self.format {
            DecodeFormat::EventStream => {
                let mut data_lines = Vec::new();
                for line in frame.lines() {
                    if let Some(rest) = line.strip_prefix("data:") {
                        data_lines.push(rest.trim());
                    } else if line.starts_with(':') {
                        // SSE comment / keepalive.
                        continue;
                    }
                    // `event:`, `id:`, `retry:` fields carry nothing here:
                    // the event type lives inside the JSON payload.
                }
                if data_lines.is_empty() {
                    return Ok(None);
                }
                data_lines.join("\n")
            }
            DecodeFormat::JsonLines => frame.trim().to_string(),
        };

        if payload.is_empty() || payload == "[DONE]" {
            return Ok(None);
        }

        serde_json::from_str::<StreamEvent>(&payload).map(Some)
    }
}

fn find_terminator(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn decode_error() -> StreamEvent {
    StreamEvent::StreamError {
        reason: ErrorReason::Decode,
        http_status: None,
    }
}
