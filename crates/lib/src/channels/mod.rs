//! Messaging channel (Twilio WhatsApp).
//!
//! Inbound messages arrive on the gateway webhook as form posts; replies go back in the
//! HTTP response as a TwiML envelope. The outbound client sends messages outside the
//! webhook flow (plain text or approved templates).

mod inbound;
mod twilio;
mod twiml;

pub use inbound::InboundMessage;
pub use twilio::{whatsapp_address, TwilioClient, TwilioError, WebhookForm};
pub use twiml::MessagingResponse;
