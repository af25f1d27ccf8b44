//! Assistant provider abstraction and the OpenAI Assistants v2 client.
//!
//! The provider owns threads (conversation history), messages, and runs; the relay
//! only creates them and observes run status.

#[cfg(test)]
pub(crate) mod mock;
mod openai;

pub use openai::{
    AssistantError, MessageContent, OpenAiClient, OpenAiModel, Run, RunStatus, TextContent,
    ThreadMessage,
};

use async_trait::async_trait;

/// Operations the relay needs from a hosted assistant. Implemented by [`OpenAiClient`];
/// tests provide scripted implementations.
#[async_trait]
pub trait AssistantProvider: Send + Sync {
    /// Create an empty thread; returns its id.
    async fn create_thread(&self) -> Result<String, AssistantError>;

    /// Append a message with the given role to a thread.
    async fn append_message(
        &self,
        thread_id: &str,
        role: &str,
        content: &str,
    ) -> Result<(), AssistantError>;

    /// Start a run of `assistant_id` over the thread's history.
    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, AssistantError>;

    /// Current state of a run.
    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, AssistantError>;

    /// Ask the provider to stop a run that is still queued or in progress.
    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<(), AssistantError>;

    /// Thread messages, most recent first.
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, AssistantError>;
}
