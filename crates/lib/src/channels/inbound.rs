//! Inbound message from a channel: delivered to the relay for session/assistant handling.

/// A message from the channel, keyed by its sender address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Sender address including the channel scheme (e.g. "whatsapp:+15551234567").
    pub sender: String,
    pub text: String,
}
