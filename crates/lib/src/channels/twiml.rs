//! TwiML messaging reply envelope: `<Response><Message>text</Message></Response>`.

use quick_xml::escape::escape;

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Reply document for a Twilio messaging webhook. Each message is sent back to the sender.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagingResponse {
    messages: Vec<String>,
}

impl MessagingResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `<Message>` with the given body text.
    pub fn message(&mut self, body: impl Into<String>) -> &mut Self {
        self.messages.push(body.into());
        self
    }

    /// Serialize to TwiML. An envelope without messages tells Twilio to send nothing.
    pub fn to_xml(&self) -> String {
        let mut out = String::from(XML_DECLARATION);
        if self.messages.is_empty() {
            out.push_str("<Response />");
            return out;
        }
        out.push_str("<Response>");
        for body in &self.messages {
            out.push_str("<Message>");
            out.push_str(&escape(body.as_str()));
            out.push_str("</Message>");
        }
        out.push_str("</Response>");
        out
    }
}

impl std::fmt::Display for MessagingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_xml())
    }
}
