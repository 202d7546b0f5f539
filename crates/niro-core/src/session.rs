use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::error::Result;
use crate::model::SessionState;

/// Trait for session persistence.
///
/// Implementations:
/// - `InMemorySessionStore`: process-local, the default deployment shape
/// - test doubles that fail or count calls
pub trait SessionStore: Send + Sync {
    fn get(
        &self,
        session_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<SessionState>>> + Send;

    /// Upsert the full session state. Turns commit through this single call,
    /// so a session is either fully updated or untouched.
    fn put(
        &self,
        state: SessionState,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Returns `true` when a session existed and was removed.
    fn delete(&self, session_id: &str) -> impl std::future::Future<Output = Result<bool>> + Send;

    fn count(&self) -> impl std::future::Future<Output = Result<usize>> + Send;
}

/// Process-local session store.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, SessionState>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<SessionState>> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn put(&self, state: SessionState) -> Result<()> {
        self.sessions
            .write()
            .await
            .insert(state.session_id.clone(), state);
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<bool> {
        Ok(self.sessions.write().await.remove(session_id).is_some())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.sessions.read().await.len())
    }
}
