//! Session management for the Streamable HTTP transport.
//!
//! A *session* groups the logically related interactions between a single MCP
//! client and the server, starting from the `initialize` handshake. The server
//! assigns each session a unique [`SessionId`] (returned to the client via the
//! `Mcp-Session-Id` response header) and the client includes that ID on every
//! subsequent request.
//!
//! The [`SessionRegistry`] is the sole long-lived owner of every session's
//! transport. A key is present exactly while its transport is open.

use std::{
    collections::{HashMap, hash_map::Entry},
    sync::Arc,
};

use tokio::sync::RwLock;

pub type SessionId = Arc<str>;

/// A fresh, unguessable session id (UUID v4 drawn from the OS CSPRNG).
pub fn session_id() -> SessionId {
    uuid::Uuid::new_v4().to_string().into()
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session {0} is already bound to a different transport")]
    AlreadyRegistered(SessionId),
    #[error("session id must not be empty")]
    EmptySessionId,
}

/// In-memory map from session id to that session's transport.
pub struct SessionRegistry<T> {
    sessions: RwLock<HashMap<SessionId, Arc<T>>>,
}

impl<T> Default for SessionRegistry<T> {
    fn default() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> std::fmt::Debug for SessionRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry").finish_non_exhaustive()
    }
}

impl<T> SessionRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &str) -> Option<Arc<T>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Register `transport` under `id`.
    ///
    /// Putting the same transport twice is a no-op; putting a different
    /// transport under a taken id is refused.
    pub async fn put(&self, id: SessionId, transport: Arc<T>) -> Result<(), SessionError> {
        if id.is_empty() {
            return Err(SessionError::EmptySessionId);
        }
        let mut sessions = self.sessions.write().await;
        match sessions.entry(id) {
            Entry::Occupied(entry) => {
                if Arc::ptr_eq(entry.get(), &transport) {
                    Ok(())
                } else {
                    Err(SessionError::AlreadyRegistered(entry.key().clone()))
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(transport);
                Ok(())
            }
        }
    }

    pub async fn remove(&self, id: &str) -> Option<Arc<T>> {
        self.sessions.write().await.remove(id)
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Take every entry out of the registry.
    pub async fn drain(&self) -> Vec<(SessionId, Arc<T>)> {
        self.sessions.write().await.drain().collect()
    }
}
