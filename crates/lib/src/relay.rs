//! Relay turn: resolve the sender's session, submit the message, run the assistant,
//! wait for the run to finish, and pick the assistant's reply.
//!
//! Non-success run outcomes and missing replies become fixed user-facing strings;
//! only provider errors fail the turn.

use crate::assistant::{AssistantError, AssistantProvider, Run, RunStatus};
use crate::config::AssistantConfig;
use crate::session::SessionRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const FAILED_REPLY: &str = "Desculpe, houve um problema ao processar sua mensagem.";
pub const CANCELLED_REPLY: &str =
    "A operação foi cancelada ou expirou. Por favor, tente novamente.";
pub const TIMED_OUT_REPLY: &str = "A operação demorou demais. Por favor, tente novamente.";
pub const NO_REPLY_FALLBACK: &str = "Desculpe, não consegui processar sua mensagem.";

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Assistant(#[from] AssistantError),
}

/// How a run ended, as seen by the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// `failed` or `incomplete`.
    Failed,
    /// `expired` or `cancelled`.
    CancelledOrExpired,
    /// The configured maximum wait elapsed first.
    TimedOut,
    /// The cancellation token fired (server shutdown).
    Aborted,
}

impl RunOutcome {
    /// Fixed reply for outcomes that have no assistant message to extract.
    pub fn user_message(self) -> Option<&'static str> {
        match self {
            RunOutcome::Completed => None,
            RunOutcome::Failed => Some(FAILED_REPLY),
            RunOutcome::CancelledOrExpired | RunOutcome::Aborted => Some(CANCELLED_REPLY),
            RunOutcome::TimedOut => Some(TIMED_OUT_REPLY),
        }
    }
}

/// Poll interval and optional upper bound on the total wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_wait: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from(&AssistantConfig::default())
    }
}

impl From<&AssistantConfig> for PollPolicy {
    fn from(config: &AssistantConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            max_wait: config.max_wait(),
        }
    }
}

/// Append a user message to the session. Content is forwarded as-is, empty included.
pub async fn submit(
    provider: &dyn AssistantProvider,
    session: &str,
    content: &str,
) -> Result<(), AssistantError> {
    provider.append_message(session, "user", content).await?;
    log::info!("message added to session {}", session);
    Ok(())
}

/// Start a run of the assistant over the session's history. Returns without waiting.
pub async fn execute(
    provider: &dyn AssistantProvider,
    session: &str,
    assistant_id: &str,
) -> Result<Run, AssistantError> {
    let run = provider.create_run(session, assistant_id).await?;
    log::info!("assistant run started on session {}: {}", session, run.id);
    Ok(run)
}

/// Poll the run until it reaches a terminal state, the wait bound elapses, or `cancel` fires.
/// The first status query is immediate; each following one is `policy.interval` later,
/// or sooner when the deadline falls inside the interval.
///
/// A run abandoned by timeout or cancellation is cancelled on the provider, so the thread
/// accepts the sender's next message.
pub async fn await_run(
    provider: &dyn AssistantProvider,
    session: &str,
    run: &Run,
    policy: PollPolicy,
    cancel: &CancellationToken,
) -> Result<RunOutcome, AssistantError> {
    let deadline = policy.max_wait.map(|d| Instant::now() + d);
    loop {
        let polled = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            r = provider.get_run(session, &run.id) => Some(r?),
        };
        let Some(current) = polled else {
            return Ok(abandon(provider, session, run, RunOutcome::Aborted).await);
        };
        if current.status.is_terminal() {
            return Ok(terminal_outcome(&run.id, &current.status));
        }
        log::debug!("run {} status {}", run.id, current.status);
        let mut pause = policy.interval;
        if let Some(deadline) = deadline {
            let now = Instant::now();
            if now >= deadline {
                log::warn!("run {} still pending after max wait, giving up", run.id);
                return Ok(abandon(provider, session, run, RunOutcome::TimedOut).await);
            }
            pause = pause.min(deadline - now);
        }
        let aborted = tokio::select! {
            biased;
            _ = cancel.cancelled() => true,
            _ = tokio::time::sleep(pause) => false,
        };
        if aborted {
            return Ok(abandon(provider, session, run, RunOutcome::Aborted).await);
        }
    }
}

fn terminal_outcome(run_id: &str, status: &RunStatus) -> RunOutcome {
    match status {
        RunStatus::Completed => RunOutcome::Completed,
        RunStatus::Failed | RunStatus::Incomplete => {
            log::warn!("run {} ended with status {}", run_id, status);
            RunOutcome::Failed
        }
        _ => {
            log::warn!("run {} ended with status {}", run_id, status);
            RunOutcome::CancelledOrExpired
        }
    }
}

/// Best-effort provider cancel of a run the relay stopped waiting for.
async fn abandon(
    provider: &dyn AssistantProvider,
    session: &str,
    run: &Run,
    outcome: RunOutcome,
) -> RunOutcome {
    match provider.cancel_run(session, &run.id).await {
        Ok(()) => log::info!("run {} cancelled on session {}", run.id, session),
        Err(e) => log::warn!("could not cancel run {}: {}", run.id, e),
    }
    outcome
}

/// Text of the most recent assistant message produced by `run`, or the fixed fallback.
///
/// A message belongs to the run when its `run_id` matches; untagged messages count
/// when they were created no earlier than the run.
pub async fn extract_latest_reply(
    provider: &dyn AssistantProvider,
    session: &str,
    run: &Run,
) -> Result<String, AssistantError> {
    let messages = provider.list_messages(session).await?;
    let reply = messages
        .iter()
        .filter(|m| m.role == "assistant")
        .filter(|m| match m.run_id.as_deref() {
            Some(id) => id == run.id,
            None => m.created_at >= run.created_at,
        })
        .find_map(|m| m.text());
    match reply {
        Some(text) => Ok(text.to_string()),
        None => {
            log::warn!("no assistant reply found for run {}", run.id);
            Ok(NO_REPLY_FALLBACK.to_string())
        }
    }
}

/// The full relay pipeline over one provider and session registry.
pub struct Relay {
    provider: Arc<dyn AssistantProvider>,
    sessions: Arc<dyn SessionRegistry>,
    assistant_id: String,
    policy: PollPolicy,
}

impl Relay {
    pub fn new(
        provider: Arc<dyn AssistantProvider>,
        sessions: Arc<dyn SessionRegistry>,
        assistant_id: impl Into<String>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            provider,
            sessions,
            assistant_id: assistant_id.into(),
            policy,
        }
    }

    pub fn sessions(&self) -> &Arc<dyn SessionRegistry> {
        &self.sessions
    }

    /// Run one turn for `sender` and return the text to send back.
    pub async fn handle_message(
        &self,
        sender: &str,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<String, RelayError> {
        let provider = self.provider.as_ref();
        let session = self.sessions.resolve(sender).await?;
        submit(provider, &session, text).await?;
        let run = execute(provider, &session, &self.assistant_id).await?;
        let outcome = await_run(provider, &session, &run, self.policy, cancel).await?;
        let reply = match outcome.user_message() {
            Some(msg) => msg.to_string(),
            None => extract_latest_reply(provider, &session, &run).await?,
        };
        Ok(reply)
    }
}
