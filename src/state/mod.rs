//! Conversation history and the single-in-flight-turn guard.

use anyhow::{bail, Result};

use crate::message::{Message, Role};

/// Ordered message history for one conversation.
///
/// Exactly one assistant message may be in flight at a time: the message
/// handed out by [`begin_assistant_turn`](Conversation::begin_assistant_turn)
/// is owned by the pipeline until it comes back sealed through
/// [`complete_turn`](Conversation::complete_turn). This is what keeps two
/// streams' events from ever interleaving in one assembler.
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    next_seq: u64,
    in_flight: Option<String>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn turn_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Record a user message. Rejected while a turn is still streaming.
    pub fn push_user(&mut self, text: impl Into<String>) -> Result<()> {
        if let Some(id) = &self.in_flight {
            bail!("assistant message '{id}' is still streaming");
        }
        let id = self.next_id();
        self.messages.push(Message::user(id, text));
        Ok(())
    }

    /// Hand out a fresh assistant message for the pipeline to fold into.
    pub fn begin_assistant_turn(&mut self) -> Result<Message> {
        if let Some(id) = &self.in_flight {
            bail!("assistant message '{id}' is still streaming");
        }
        match self.messages.last() {
            Some(last) if last.role == Role::User => {}
            _ => bail!("an assistant turn must follow a user message"),
        }
        let id = self.next_id();
        self.in_flight = Some(id.clone());
        Ok(Message::assistant(id))
    }

    /// Write a sealed assistant message back into history.
    pub fn complete_turn(&mut self, message: Message) -> Result<()> {
        if !message.is_sealed() {
            bail!("cannot record an unsealed message");
        }
        match &self.in_flight {
            Some(id) if *id == message.id => {}
            Some(id) => bail!("message '{}' is not the in-flight turn '{id}'", message.id),
            None => bail!("no turn in flight"),
        }
        self.in_flight = None;
        self.messages.push(message);
        Ok(())
    }

    /// Begin a retry turn after an error or cancellation.
    ///
    /// Retry re-runs the whole pipeline against a brand-new message over
    /// a fresh connection; it never resumes a partial stream. The cut-off
    /// message stays in history; partial content is never deleted
    /// outside a full clear.
    pub fn retry_last(&mut self) -> Result<Message> {
        if let Some(id) = &self.in_flight {
            bail!("assistant message '{id}' is still streaming");
        }
        match self.messages.last() {
            Some(last)
                if last.role == Role::Assistant
                    && (last.fault.is_some() || last.cancelled) => {}
            _ => bail!("retry requires a last assistant message sealed by error or cancellation"),
        }
        let id = self.next_id();
        self.in_flight = Some(id.clone());
        Ok(Message::assistant(id))
    }

    /// Full conversation clear, the only operation that deletes messages.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.in_flight = None;
    }

    fn next_id(&mut self) -> String {
        self.next_seq += 1;
        format!("msg-{}", self.next_seq)
    }
}
