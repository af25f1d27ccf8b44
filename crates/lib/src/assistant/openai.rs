//! OpenAI Assistants API v2 client (https://api.openai.com/v1 by default).
//! Threads, messages, and runs; every request carries the `OpenAI-Beta: assistants=v2` header.

use crate::assistant::AssistantProvider;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const BETA_HEADER: &str = "OpenAI-Beta";
const BETA_VALUE: &str = "assistants=v2";

/// Client for the OpenAI Assistants HTTP API.
#[derive(Clone)]
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("openai request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("openai api error: {0}")]
    Api(String),
}

/// Lifecycle state of a run. Transitions are owned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    /// A status this client does not know; treated as non-terminal.
    Unknown(String),
}

impl RunStatus {
    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Expired => "expired",
            RunStatus::Unknown(s) => s,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Cancelled
                | RunStatus::Failed
                | RunStatus::Completed
                | RunStatus::Incomplete
                | RunStatus::Expired
        )
    }
}

impl From<String> for RunStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "queued" => RunStatus::Queued,
            "in_progress" => RunStatus::InProgress,
            "requires_action" => RunStatus::RequiresAction,
            "cancelling" => RunStatus::Cancelling,
            "cancelled" => RunStatus::Cancelled,
            "failed" => RunStatus::Failed,
            "completed" => RunStatus::Completed,
            "incomplete" => RunStatus::Incomplete,
            "expired" => RunStatus::Expired,
            _ => RunStatus::Unknown(s),
        }
    }
}

impl From<RunStatus> for String {
    fn from(s: RunStatus) -> Self {
        s.as_str().to_string()
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One assistant invocation against a thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
    pub status: RunStatus,
    /// Unix seconds.
    #[serde(default)]
    pub created_at: i64,
}

/// A message in a thread (role "user" or "assistant").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    pub role: String,
    /// Unix seconds.
    #[serde(default)]
    pub created_at: i64,
    /// Set on assistant messages produced by a run.
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub content: Vec<MessageContent>,
}

impl ThreadMessage {
    /// Primary text: the value of the first text content part.
    pub fn text(&self) -> Option<&str> {
        self.content.iter().find_map(|c| match c {
            MessageContent::Text { text } => Some(text.value.as_str()),
            MessageContent::Other => None,
        })
    }
}

/// Content part of a message. Only text is read; images and other parts are skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: TextContent },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextContent {
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiModel {
    pub id: String,
}

#[derive(Debug, Deserialize)]
struct ThreadObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Serialize)]
struct CreateMessageRequest<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateRunRequest<'a> {
    assistant_id: &'a str,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header(BETA_HEADER, BETA_VALUE)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header(BETA_HEADER, BETA_VALUE)
    }

    /// GET /models: used by health checks to confirm the key works.
    pub async fn list_models(&self) -> Result<Vec<OpenAiModel>, AssistantError> {
        let res = check(self.get("/models").send().await?).await?;
        let data: ListResponse<OpenAiModel> = res.json().await?;
        Ok(data.data)
    }
}

/// Map a non-success response to `AssistantError::Api` with status and body.
async fn check(res: reqwest::Response) -> Result<reqwest::Response, AssistantError> {
    if res.status().is_success() {
        return Ok(res);
    }
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    Err(AssistantError::Api(format!("{} {}", status, body)))
}

#[async_trait]
impl AssistantProvider for OpenAiClient {
    /// POST /threads
    async fn create_thread(&self) -> Result<String, AssistantError> {
        let res = check(self.post("/threads").json(&serde_json::json!({})).send().await?).await?;
        let thread: ThreadObject = res.json().await?;
        Ok(thread.id)
    }

    /// POST /threads/{thread_id}/messages
    async fn append_message(
        &self,
        thread_id: &str,
        role: &str,
        content: &str,
    ) -> Result<(), AssistantError> {
        let path = format!("/threads/{}/messages", thread_id);
        let body = CreateMessageRequest { role, content };
        check(self.post(&path).json(&body).send().await?).await?;
        Ok(())
    }

    /// POST /threads/{thread_id}/runs
    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, AssistantError> {
        let path = format!("/threads/{}/runs", thread_id);
        let body = CreateRunRequest { assistant_id };
        let res = check(self.post(&path).json(&body).send().await?).await?;
        Ok(res.json().await?)
    }

    /// GET /threads/{thread_id}/runs/{run_id}
    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, AssistantError> {
        let path = format!("/threads/{}/runs/{}", thread_id, run_id);
        let res = check(self.get(&path).send().await?).await?;
        Ok(res.json().await?)
    }

    /// POST /threads/{thread_id}/runs/{run_id}/cancel
    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<(), AssistantError> {
        let path = format!("/threads/{}/runs/{}/cancel", thread_id, run_id);
        check(self.post(&path).send().await?).await?;
        Ok(())
    }

    /// GET /threads/{thread_id}/messages?order=desc
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, AssistantError> {
        let path = format!("/threads/{}/messages?order=desc", thread_id);
        let res = check(self.get(&path).send().await?).await?;
        let data: ListResponse<ThreadMessage> = res.json().await?;
        Ok(data.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::{GET, POST};
    use httpmock::MockServer;

    #[test]
    fn run_status_parses_known_and_unknown_values() {
        let s: RunStatus = serde_json::from_str("\"in_progress\"").unwrap();
        assert_eq!(s, RunStatus::InProgress);
        assert!(!s.is_terminal());
        let s: RunStatus = serde_json::from_str("\"expired\"").unwrap();
        assert!(s.is_terminal());
        let s: RunStatus = serde_json::from_str("\"paused\"").unwrap();
        assert_eq!(s, RunStatus::Unknown("paused".to_string()));
        assert!(!s.is_terminal());
        assert_eq!(s.to_string(), "paused");
    }

    #[test]
    fn message_text_skips_non_text_parts() {
        let json = r#"{
            "id": "msg_1",
            "role": "assistant",
            "created_at": 10,
            "run_id": "run_1",
            "content": [
                { "type": "image_file", "image_file": { "file_id": "file_1" } },
                { "type": "text", "text": { "value": "ola", "annotations": [] } }
            ]
        }"#;
        let msg: ThreadMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.text(), Some("ola"));
        assert_eq!(msg.run_id.as_deref(), Some("run_1"));
    }

    #[tokio::test]
    async fn create_thread_sends_beta_header_and_bearer_token() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/threads")
                .header("authorization", "Bearer sk-test")
                .header("openai-beta", "assistants=v2");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"id":"thread_abc","object":"thread"}"#);
        });
        let client = OpenAiClient::new("sk-test", Some(server.base_url()));
        let id = client.create_thread().await.unwrap();
        assert_eq!(id, "thread_abc");
        mock.assert();
    }

    #[tokio::test]
    async fn append_message_posts_user_role_and_content() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/threads/thread_abc/messages")
                .json_body(serde_json::json!({ "role": "user", "content": "Hello" }));
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"id":"msg_1","role":"user","content":[]}"#);
        });
        let client = OpenAiClient::new("sk-test", Some(server.base_url()));
        client
            .append_message("thread_abc", "user", "Hello")
            .await
            .unwrap();
        mock.assert();
    }

    #[tokio::test]
    async fn create_and_get_run_parse_status() {
        let server = MockServer::start_async().await;
        let create = server.mock(|when, then| {
            when.method(POST)
                .path("/threads/thread_abc/runs")
                .json_body(serde_json::json!({ "assistant_id": "asst_1" }));
            then.status(200).header("content-type", "application/json").body(
                r#"{"id":"run_1","thread_id":"thread_abc","status":"queued","created_at":100}"#,
            );
        });
        let get = server.mock(|when, then| {
            when.method(GET).path("/threads/thread_abc/runs/run_1");
            then.status(200).header("content-type", "application/json").body(
                r#"{"id":"run_1","thread_id":"thread_abc","status":"completed","created_at":100}"#,
            );
        });
        let client = OpenAiClient::new("sk-test", Some(server.base_url()));
        let run = client.create_run("thread_abc", "asst_1").await.unwrap();
        assert_eq!(run.status, RunStatus::Queued);
        assert_eq!(run.created_at, 100);
        let run = client.get_run("thread_abc", "run_1").await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        create.assert();
        get.assert();
    }

    #[tokio::test]
    async fn cancel_run_posts_to_cancel_endpoint() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/threads/thread_abc/runs/run_1/cancel")
                .header("OpenAI-Beta", "assistants=v2");
            then.status(200).header("content-type", "application/json").body(
                r#"{"id":"run_1","thread_id":"thread_abc","status":"cancelling","created_at":100}"#,
            );
        });
        let client = OpenAiClient::new("sk-test", Some(server.base_url()));
        client.cancel_run("thread_abc", "run_1").await.unwrap();
        mock.assert();
    }

    #[tokio::test]
    async fn list_messages_requests_descending_order() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/threads/thread_abc/messages")
                .query_param("order", "desc");
            then.status(200).header("content-type", "application/json").body(
                r#"{"object":"list","data":[
                    {"id":"msg_2","role":"assistant","created_at":2,"run_id":"run_1",
                     "content":[{"type":"text","text":{"value":"Oi!","annotations":[]}}]},
                    {"id":"msg_1","role":"user","created_at":1,
                     "content":[{"type":"text","text":{"value":"Hello","annotations":[]}}]}
                ]}"#,
            );
        });
        let client = OpenAiClient::new("sk-test", Some(server.base_url()));
        let messages = client.list_messages("thread_abc").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "assistant");
        assert_eq!(messages[0].text(), Some("Oi!"));
        mock.assert();
    }

    #[tokio::test]
    async fn non_success_status_is_api_error() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/threads");
            then.status(401).body("invalid api key");
        });
        let client = OpenAiClient::new("sk-bad", Some(server.base_url()));
        let err = client.create_thread().await.unwrap_err();
        match err {
            AssistantError::Api(msg) => {
                assert!(msg.contains("401"));
                assert!(msg.contains("invalid api key"));
            }
            other => panic!("expected api error, got {:?}", other),
        }
    }
}
