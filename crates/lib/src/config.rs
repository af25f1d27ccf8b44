//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.relay/config.json`) and then
//! overridden from the environment (`OPENAI_API_KEY`, `TWILIO_AUTH_TOKEN`, `PORT`, ...).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Assistant provider settings (OpenAI Assistants API).
    #[serde(default)]
    pub assistant: AssistantConfig,

    /// Channel settings (Twilio WhatsApp).
    #[serde(default)]
    pub channels: ChannelsConfig,
}

/// Gateway bind, port, and debug settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 5000). Overridden by PORT env.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0"; the webhook must be reachable by Twilio).
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Verbose logging. Overridden by DEBUG env ("true" enables). The CLI logger level
    /// is chosen before the file is read, so only DEBUG raises it.
    #[serde(default)]
    pub debug: bool,
}

fn default_gateway_port() -> u16 {
    5000
}

fn default_gateway_bind() -> String {
    "0.0.0.0".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            debug: false,
        }
    }
}

/// Assistant provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantConfig {
    /// API key. Overridden by OPENAI_API_KEY env.
    pub api_key: Option<String>,

    /// Assistant id every run is created against. Overridden by OPENAI_ASSISTANT_ID env.
    pub assistant_id: Option<String>,

    /// API base URL (default "https://api.openai.com/v1"). Overridden by OPENAI_BASE_URL env.
    pub base_url: Option<String>,

    /// Delay between run status queries, in milliseconds (default 1000).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound on waiting for one run, in seconds (default 120). 0 waits forever.
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_wait_secs() -> u64 {
    120
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            assistant_id: None,
            base_url: None,
            poll_interval_ms: default_poll_interval_ms(),
            max_wait_secs: default_max_wait_secs(),
        }
    }
}

impl AssistantConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// None when the wait is unbounded.
    pub fn max_wait(&self) -> Option<Duration> {
        if self.max_wait_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.max_wait_secs))
        }
    }
}

/// Per-channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub twilio: TwilioChannelConfig,
}

/// Twilio channel config (outbound messages and doctor checks; the webhook needs none of it).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwilioChannelConfig {
    /// Overridden by TWILIO_ACCOUNT_SID env.
    pub account_sid: Option<String>,
    /// Overridden by TWILIO_AUTH_TOKEN env.
    pub auth_token: Option<String>,
    /// Sender address for outbound messages (default is the Twilio WhatsApp sandbox number).
    pub from_number: Option<String>,
    /// API base URL (default "https://api.twilio.com").
    pub api_base: Option<String>,
}

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TWILIO_API_BASE: &str = "https://api.twilio.com";
pub const DEFAULT_TWILIO_FROM: &str = "whatsapp:+14155238886";

/// Environment variables that must be set (or configured) for the full service to work.
pub const REQUIRED_ENV_VARS: [&str; 4] = [
    "TWILIO_ACCOUNT_SID",
    "TWILIO_AUTH_TOKEN",
    "OPENAI_API_KEY",
    "OPENAI_ASSISTANT_ID",
];

/// Trimmed, non-empty env var.
fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn config_nonempty(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// DEBUG env as a flag ("true" in any case enables). None when unset or blank.
pub fn debug_from_env() -> Option<bool> {
    env_nonempty("DEBUG").map(|v| v.eq_ignore_ascii_case("true"))
}

/// Apply environment overrides on top of file config. Env always wins when set.
pub fn apply_env_overrides(config: &mut Config) {
    if let Some(port) = env_nonempty("PORT") {
        match port.parse::<u16>() {
            Ok(p) => config.gateway.port = p,
            Err(_) => log::warn!("ignoring invalid PORT value: {}", port),
        }
    }
    if let Some(debug) = debug_from_env() {
        config.gateway.debug = debug;
    }
    let twilio = &mut config.channels.twilio;
    let overrides: [(&str, &mut Option<String>); 7] = [
        ("OPENAI_API_KEY", &mut config.assistant.api_key),
        ("OPENAI_ASSISTANT_ID", &mut config.assistant.assistant_id),
        ("OPENAI_BASE_URL", &mut config.assistant.base_url),
        ("TWILIO_ACCOUNT_SID", &mut twilio.account_sid),
        ("TWILIO_AUTH_TOKEN", &mut twilio.auth_token),
        ("TWILIO_WHATSAPP_FROM", &mut twilio.from_number),
        ("TWILIO_API_BASE", &mut twilio.api_base),
    ];
    for (name, slot) in overrides {
        if let Some(v) = env_nonempty(name) {
            *slot = Some(v);
        }
    }
}

pub fn resolve_openai_api_key(config: &Config) -> Option<String> {
    config_nonempty(&config.assistant.api_key)
}

pub fn resolve_assistant_id(config: &Config) -> Option<String> {
    config_nonempty(&config.assistant.assistant_id)
}

pub fn resolve_openai_base_url(config: &Config) -> String {
    config_nonempty(&config.assistant.base_url)
        .map(|u| u.trim_end_matches('/').to_string())
        .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string())
}

pub fn resolve_twilio_api_base(config: &Config) -> String {
    config_nonempty(&config.channels.twilio.api_base)
        .map(|u| u.trim_end_matches('/').to_string())
        .unwrap_or_else(|| DEFAULT_TWILIO_API_BASE.to_string())
}

pub fn resolve_twilio_from(config: &Config) -> String {
    config_nonempty(&config.channels.twilio.from_number)
        .unwrap_or_else(|| DEFAULT_TWILIO_FROM.to_string())
}

/// Names of required credentials that are neither configured nor in the environment.
pub fn missing_env_vars(config: &Config) -> Vec<&'static str> {
    let present = [
        config_nonempty(&config.channels.twilio.account_sid).is_some(),
        config_nonempty(&config.channels.twilio.auth_token).is_some(),
        resolve_openai_api_key(config).is_some(),
        resolve_assistant_id(config).is_some(),
    ];
    REQUIRED_ENV_VARS
        .iter()
        .zip(present)
        .filter(|(_, ok)| !ok)
        .map(|(name, _)| *name)
        .collect()
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("RELAY_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".relay").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path (or the default). Missing file => default config.
/// Environment overrides are applied afterwards. Returns the config and the path used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let mut config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    apply_env_overrides(&mut config);
    Ok((config, path))
}
