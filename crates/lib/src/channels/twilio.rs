//! Twilio WhatsApp channel: webhook form payload and the REST client for outbound messages.

use crate::channels::inbound::InboundMessage;
use crate::config::{self, Config};
use serde::Deserialize;

const API_VERSION: &str = "2010-04-01";
const WHATSAPP_SCHEME: &str = "whatsapp:";

/// Form body Twilio POSTs to the messaging webhook. Only the fields the relay reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookForm {
    #[serde(rename = "Body", default)]
    pub body: String,
    #[serde(rename = "From", default)]
    pub from: String,
}

impl From<WebhookForm> for InboundMessage {
    fn from(form: WebhookForm) -> Self {
        InboundMessage {
            sender: form.from,
            text: form.body,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TwilioError {
    #[error("twilio request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("twilio api error: {0}")]
    Api(String),
    #[error("twilio credentials not configured (set TWILIO_ACCOUNT_SID and TWILIO_AUTH_TOKEN)")]
    NotConfigured,
}

#[derive(Debug, Deserialize)]
struct SidResponse {
    sid: String,
}

/// Address a number on WhatsApp: bare numbers get the `whatsapp:` prefix.
pub fn whatsapp_address(number: &str) -> String {
    let n = number.trim();
    if n.starts_with(WHATSAPP_SCHEME) {
        n.to_string()
    } else {
        format!("{}{}", WHATSAPP_SCHEME, n)
    }
}

/// Twilio REST client (Messages and Accounts resources).
#[derive(Clone)]
pub struct TwilioClient {
    account_sid: String,
    auth_token: String,
    from: String,
    api_base: String,
    client: reqwest::Client,
}

impl TwilioClient {
    pub fn new(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        from: impl Into<String>,
        api_base: Option<String>,
    ) -> Self {
        let api_base = api_base
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| config::DEFAULT_TWILIO_API_BASE.to_string());
        Self {
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            from: from.into(),
            api_base,
            client: reqwest::Client::new(),
        }
    }

    /// Build from config; fails when the account sid or auth token is missing.
    pub fn from_config(config: &Config) -> Result<Self, TwilioError> {
        let twilio = &config.channels.twilio;
        let sid = twilio
            .account_sid
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(TwilioError::NotConfigured)?;
        let token = twilio
            .auth_token
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(TwilioError::NotConfigured)?;
        Ok(Self::new(
            sid,
            token,
            config::resolve_twilio_from(config),
            Some(config::resolve_twilio_api_base(config)),
        ))
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/{}/Accounts/{}/Messages.json",
            self.api_base, API_VERSION, self.account_sid
        )
    }

    async fn create_message(&self, form: &[(&str, &str)]) -> Result<String, TwilioError> {
        let res = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(form)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(TwilioError::Api(format!("{} {}", status, body)));
        }
        let data: SidResponse = res.json().await?;
        Ok(data.sid)
    }

    /// Send a plain text message. Returns the Twilio message sid.
    pub async fn send_message(&self, to: &str, body: &str) -> Result<String, TwilioError> {
        let to = whatsapp_address(to);
        let sid = self
            .create_message(&[
                ("From", self.from.as_str()),
                ("To", to.as_str()),
                ("Body", body),
            ])
            .await?;
        log::info!("twilio message {} sent to {}", sid, to);
        Ok(sid)
    }

    /// Send an approved content template (needed to open a conversation outside the
    /// 24-hour window). `variables` is sent as the JSON `ContentVariables` object.
    pub async fn send_template_message(
        &self,
        to: &str,
        template_id: &str,
        variables: &serde_json::Value,
    ) -> Result<String, TwilioError> {
        let to = whatsapp_address(to);
        let variables = variables.to_string();
        let sid = self
            .create_message(&[
                ("From", self.from.as_str()),
                ("To", to.as_str()),
                ("ContentSid", template_id),
                ("ContentVariables", variables.as_str()),
            ])
            .await?;
        log::info!("twilio template {} sent to {}: {}", template_id, to, sid);
        Ok(sid)
    }

    /// GET the account resource; returns its sid. Used by health checks.
    pub async fn fetch_account(&self) -> Result<String, TwilioError> {
        let url = format!(
            "{}/{}/Accounts/{}.json",
            self.api_base, API_VERSION, self.account_sid
        );
        let res = self
            .client
            .get(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(TwilioError::Api(format!("{} {}", status, body)));
        }
        let data: SidResponse = res.json().await?;
        Ok(data.sid)
    }
}
