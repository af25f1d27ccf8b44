//! Health checks for a deployment: credentials present, web server answering,
//! OpenAI and Twilio reachable with the configured credentials.

use crate::assistant::OpenAiClient;
use crate::channels::TwilioClient;
use crate::config::{self, Config};
use std::time::{Duration, Instant};

const WEB_SERVER_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

impl CheckResult {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            passed: true,
            detail: detail.into(),
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            passed: false,
            detail: detail.into(),
        }
    }
}

/// All check results plus total duration.
#[derive(Debug, Clone)]
pub struct DoctorReport {
    pub checks: Vec<CheckResult>,
    pub duration: Duration,
}

impl DoctorReport {
    pub fn healthy(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }
}

pub fn check_env_vars(config: &Config) -> CheckResult {
    let missing = config::missing_env_vars(config);
    if missing.is_empty() {
        CheckResult::pass("environment", "all required variables are set")
    } else {
        CheckResult::fail("environment", format!("missing: {}", missing.join(", ")))
    }
}

/// GET `{base_url}/health` must answer 200.
pub async fn check_web_server(base_url: &str) -> CheckResult {
    const NAME: &str = "web server";
    let url = format!("{}/health", base_url.trim_end_matches('/'));
    let client = match reqwest::Client::builder()
        .timeout(WEB_SERVER_TIMEOUT)
        .build()
    {
        Ok(c) => c,
        Err(e) => return CheckResult::fail(NAME, e.to_string()),
    };
    match client.get(&url).send().await {
        Ok(res) if res.status().is_success() => {
            CheckResult::pass(NAME, format!("{} answered {}", url, res.status()))
        }
        Ok(res) => CheckResult::fail(NAME, format!("{} answered {}", url, res.status())),
        Err(e) => CheckResult::fail(NAME, format!("could not reach {}: {}", url, e)),
    }
}

/// List models with the configured key.
pub async fn check_openai(config: &Config) -> CheckResult {
    const NAME: &str = "openai api";
    let Some(key) = config::resolve_openai_api_key(config) else {
        return CheckResult::fail(NAME, "OPENAI_API_KEY not set");
    };
    let client = OpenAiClient::new(key, Some(config::resolve_openai_base_url(config)));
    match client.list_models().await {
        Ok(models) if !models.is_empty() => {
            CheckResult::pass(NAME, format!("{} model(s) visible", models.len()))
        }
        Ok(_) => CheckResult::fail(NAME, "model list is empty"),
        Err(e) => CheckResult::fail(NAME, e.to_string()),
    }
}

/// Fetch the configured Twilio account.
pub async fn check_twilio(config: &Config) -> CheckResult {
    const NAME: &str = "twilio api";
    let client = match TwilioClient::from_config(config) {
        Ok(c) => c,
        Err(e) => return CheckResult::fail(NAME, e.to_string()),
    };
    match client.fetch_account().await {
        Ok(sid) => CheckResult::pass(NAME, format!("account {} reachable", sid)),
        Err(e) => CheckResult::fail(NAME, e.to_string()),
    }
}

/// Run every check in order. `server_url` is the gateway base URL (e.g. "http://localhost:5000").
pub async fn run_checks(config: &Config, server_url: &str) -> DoctorReport {
    let start = Instant::now();
    let mut checks = vec![check_env_vars(config)];
    checks.push(check_web_server(server_url).await);
    checks.push(check_openai(config).await);
    checks.push(check_twilio(config).await);
    for c in &checks {
        if c.passed {
            log::debug!("doctor: {} passed: {}", c.name, c.detail);
        } else {
            log::warn!("doctor: {} failed: {}", c.name, c.detail);
        }
    }
    DoctorReport {
        checks,
        duration: start.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::GET;
    use httpmock::MockServer;

    fn configured(server: &MockServer) -> Config {
        let mut config = Config::default();
        config.assistant.api_key = Some("sk-test".to_string());
        config.assistant.assistant_id = Some("asst_1".to_string());
        config.assistant.base_url = Some(server.base_url());
        config.channels.twilio.account_sid = Some("AC123".to_string());
        config.channels.twilio.auth_token = Some("secret".to_string());
        config.channels.twilio.api_base = Some(server.base_url());
        config
    }

    #[test]
    fn env_check_names_missing_variables() {
        let result = check_env_vars(&Config::default());
        assert!(!result.passed);
        assert!(result.detail.contains("OPENAI_API_KEY"));
        assert!(result.detail.contains("TWILIO_AUTH_TOKEN"));
    }

    #[tokio::test]
    async fn all_checks_pass_against_healthy_services() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/health");
            then.status(200).body(r#"{"status":"ok"}"#);
        });
        server.mock(|when, then| {
            when.method(GET).path("/models");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"object":"list","data":[{"id":"gpt-4o"}]}"#);
        });
        server.mock(|when, then| {
            when.method(GET).path("/2010-04-01/Accounts/AC123.json");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"sid":"AC123","status":"active"}"#);
        });
        let config = configured(&server);
        let report = run_checks(&config, &server.base_url()).await;
        assert_eq!(report.checks.len(), 4);
        assert!(report.healthy(), "{:?}", report.checks);
    }

    #[tokio::test]
    async fn failing_web_server_makes_report_unhealthy() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/health");
            then.status(503);
        });
        let result = check_web_server(&server.base_url()).await;
        assert!(!result.passed);
        assert!(result.detail.contains("503"));
    }

    #[tokio::test]
    async fn openai_check_fails_without_key() {
        let result = check_openai(&Config::default()).await;
        assert!(!result.passed);
    }
}
