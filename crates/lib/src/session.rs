//! Session registry: sender identity -> provider thread id.
//!
//! Populated lazily on a sender's first message and kept for the process lifetime
//! (no eviction, no persistence). The registry is a trait so a persistent or shared
//! backing store can replace [`InMemorySessionRegistry`] without touching the gateway.

use crate::assistant::{AssistantError, AssistantProvider};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};

/// Channel-level address of the remote participant (e.g. "whatsapp:+15551234567").
pub type SenderId = String;

/// Provider-issued conversation handle (an assistant thread id).
pub type SessionHandle = String;

#[async_trait]
pub trait SessionRegistry: Send + Sync {
    /// Existing handle for `sender`, or a new provider session stored for it.
    async fn resolve(&self, sender: &str) -> Result<SessionHandle, AssistantError>;

    /// Number of senders with a session.
    async fn size(&self) -> usize;

    /// Forget every mapping. Provider sessions are left untouched.
    async fn clear(&self);
}

/// In-memory registry. `resolve` is atomic per sender: concurrent first messages from
/// one sender share a single creation call; distinct senders never wait on each other.
pub struct InMemorySessionRegistry {
    provider: Arc<dyn AssistantProvider>,
    inner: Arc<RwLock<HashMap<SenderId, Arc<OnceCell<SessionHandle>>>>>,
}

impl InMemorySessionRegistry {
    pub fn new(provider: Arc<dyn AssistantProvider>) -> Self {
        Self {
            provider,
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn cell(&self, sender: &str) -> Arc<OnceCell<SessionHandle>> {
        let existing = self.inner.read().await.get(sender).cloned();
        match existing {
            Some(cell) => cell,
            None => self
                .inner
                .write()
                .await
                .entry(sender.to_string())
                .or_default()
                .clone(),
        }
    }
}

#[async_trait]
impl SessionRegistry for InMemorySessionRegistry {
    async fn resolve(&self, sender: &str) -> Result<SessionHandle, AssistantError> {
        let cell = self.cell(sender).await;
        let provider = self.provider.clone();
        // A failed creation leaves the cell empty; the next message retries.
        let handle = cell
            .get_or_try_init(|| async move {
                let id = provider.create_thread().await?;
                log::info!("new session created for {}: {}", sender, id);
                Ok::<_, AssistantError>(id)
            })
            .await?;
        Ok(handle.clone())
    }

    async fn size(&self) -> usize {
        self.inner
            .read()
            .await
            .values()
            .filter(|c| c.initialized())
            .count()
    }

    async fn clear(&self) {
        self.inner.write().await.clear();
    }
}
