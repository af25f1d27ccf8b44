//! Scripted in-process assistant provider for tests.
//!
//! Run statuses are returned from a script (then `completed` once the script is exhausted);
//! when a run is first observed `completed`, the configured reply is appended to the thread
//! as an assistant message tagged with that run id.

use crate::assistant::{
    AssistantError, AssistantProvider, MessageContent, Run, RunStatus, TextContent, ThreadMessage,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;

/// Number of calls made to each provider operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockCalls {
    pub create_thread: usize,
    pub append_message: usize,
    pub create_run: usize,
    pub get_run: usize,
    pub cancel_run: usize,
    pub list_messages: usize,
}

#[derive(Debug, Default)]
struct MockState {
    clock: i64,
    thread_counter: u64,
    run_counter: u64,
    /// Oldest first; reversed when listed.
    threads: HashMap<String, Vec<ThreadMessage>>,
    runs: HashMap<String, Run>,
    replied_runs: HashSet<String>,
    statuses: VecDeque<RunStatus>,
    calls: MockCalls,
    submitted: Vec<(String, String)>,
}

impl MockState {
    fn tick(&mut self) -> i64 {
        self.clock += 1;
        self.clock
    }
}

#[derive(Debug, Default)]
pub struct MockAssistant {
    state: Mutex<MockState>,
    reply: Option<String>,
    fail_create_thread: bool,
    fail_cancel_run: bool,
    create_delay: Option<Duration>,
}

impl MockAssistant {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text the assistant posts when a run completes.
    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Some(reply.into());
        self
    }

    /// Statuses returned by successive `get_run` calls, across all runs.
    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = RunStatus>) -> Self {
        self.state.get_mut().statuses = statuses.into_iter().collect();
        self
    }

    /// Make `create_thread` fail with an api error.
    pub fn failing_thread_creation(mut self) -> Self {
        self.fail_create_thread = true;
        self
    }

    /// Make `cancel_run` fail with an api error.
    pub fn failing_run_cancellation(mut self) -> Self {
        self.fail_cancel_run = true;
        self
    }

    /// Delay inside `create_thread`, to widen race windows.
    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    /// Seed a message into a thread (creating the thread if needed).
    pub async fn push_message(
        &self,
        thread_id: &str,
        role: &str,
        text: &str,
        run_id: Option<&str>,
    ) {
        let mut g = self.state.lock().await;
        let created_at = g.tick();
        g.threads
            .entry(thread_id.to_string())
            .or_default()
            .push(text_message(role, text, created_at, run_id));
    }

    /// Start a run directly, bypassing the call counters.
    pub async fn seed_run(&self, thread_id: &str) -> Run {
        let mut g = self.state.lock().await;
        new_run(&mut g, thread_id)
    }

    pub async fn calls(&self) -> MockCalls {
        self.state.lock().await.calls.clone()
    }

    /// (thread id, content) of every user message submitted through `append_message`.
    pub async fn submitted(&self) -> Vec<(String, String)> {
        self.state.lock().await.submitted.clone()
    }
}

fn text_message(role: &str, text: &str, created_at: i64, run_id: Option<&str>) -> ThreadMessage {
    ThreadMessage {
        id: format!("msg_{}", created_at),
        role: role.to_string(),
        created_at,
        run_id: run_id.map(str::to_string),
        content: vec![MessageContent::Text {
            text: TextContent {
                value: text.to_string(),
            },
        }],
    }
}

fn new_run(g: &mut MockState, thread_id: &str) -> Run {
    g.run_counter += 1;
    let run = Run {
        id: format!("run_{}", g.run_counter),
        thread_id: thread_id.to_string(),
        status: RunStatus::Queued,
        created_at: g.tick(),
    };
    g.runs.insert(run.id.clone(), run.clone());
    run
}

#[async_trait]
impl AssistantProvider for MockAssistant {
    async fn create_thread(&self) -> Result<String, AssistantError> {
        if let Some(d) = self.create_delay {
            tokio::time::sleep(d).await;
        }
        let mut g = self.state.lock().await;
        g.calls.create_thread += 1;
        if self.fail_create_thread {
            return Err(AssistantError::Api("503 provider unavailable".to_string()));
        }
        g.thread_counter += 1;
        let id = format!("thread_{}", g.thread_counter);
        g.threads.insert(id.clone(), Vec::new());
        Ok(id)
    }

    async fn append_message(
        &self,
        thread_id: &str,
        role: &str,
        content: &str,
    ) -> Result<(), AssistantError> {
        let mut g = self.state.lock().await;
        g.calls.append_message += 1;
        if !g.threads.contains_key(thread_id) {
            return Err(AssistantError::Api(format!("404 no thread {}", thread_id)));
        }
        let created_at = g.tick();
        g.submitted.push((thread_id.to_string(), content.to_string()));
        if let Some(t) = g.threads.get_mut(thread_id) {
            t.push(text_message(role, content, created_at, None));
        }
        Ok(())
    }

    async fn create_run(
        &self,
        thread_id: &str,
        _assistant_id: &str,
    ) -> Result<Run, AssistantError> {
        let mut g = self.state.lock().await;
        g.calls.create_run += 1;
        Ok(new_run(&mut g, thread_id))
    }

    async fn get_run(&self, _thread_id: &str, run_id: &str) -> Result<Run, AssistantError> {
        let mut g = self.state.lock().await;
        g.calls.get_run += 1;
        let mut run = g
            .runs
            .get(run_id)
            .cloned()
            .ok_or_else(|| AssistantError::Api(format!("404 no run {}", run_id)))?;
        run.status = g.statuses.pop_front().unwrap_or(RunStatus::Completed);
        if run.status == RunStatus::Completed && g.replied_runs.insert(run.id.clone()) {
            if let Some(reply) = self.reply.as_deref() {
                let created_at = g.tick();
                let msg = text_message("assistant", reply, created_at, Some(run.id.as_str()));
                g.threads
                    .entry(run.thread_id.clone())
                    .or_default()
                    .push(msg);
            }
        }
        g.runs.insert(run.id.clone(), run.clone());
        Ok(run)
    }

    async fn cancel_run(&self, _thread_id: &str, run_id: &str) -> Result<(), AssistantError> {
        let mut g = self.state.lock().await;
        g.calls.cancel_run += 1;
        if self.fail_cancel_run {
            return Err(AssistantError::Api("400 run cannot be cancelled".to_string()));
        }
        let run = g
            .runs
            .get_mut(run_id)
            .ok_or_else(|| AssistantError::Api(format!("404 no run {}", run_id)))?;
        run.status = RunStatus::Cancelling;
        Ok(())
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, AssistantError> {
        let mut g = self.state.lock().await;
        g.calls.list_messages += 1;
        let mut messages = g.threads.get(thread_id).cloned().unwrap_or_default();
        messages.reverse();
        Ok(messages)
    }
}
