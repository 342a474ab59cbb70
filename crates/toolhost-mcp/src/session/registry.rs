//! Live sessions keyed by session id, for the HTTP bindings.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use toolhost::Dispatcher;

use super::Session;

/// Registry of sessions opened over HTTP. Every session shares the one
/// dispatcher; nothing else crosses session boundaries.
pub struct SessionRegistry {
    dispatcher: Dispatcher,
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Open and register a fresh session.
    pub async fn create(&self) -> Arc<Session> {
        let session = Session::new(self.dispatcher.clone());
        tracing::info!("Opened session {}", session.id());
        self.sessions
            .lock()
            .await
            .insert(session.id().to_string(), session.clone());
        session
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.lock().await.get(id).cloned()
    }

    /// Close and forget a session. Returns `false` if the id was unknown.
    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.lock().await.remove(id);
        match removed {
            Some(session) => {
                session.close().await;
                true
            }
            None => false,
        }
    }

    /// Ids of sessions with nothing in flight and no traffic for at least `ttl`.
    pub async fn idle(&self, ttl: Duration) -> Vec<String> {
        let sessions: Vec<Arc<Session>> = self.sessions.lock().await.values().cloned().collect();
        let mut idle = Vec::new();
        for session in sessions {
            if session.idle_for().await.is_some_and(|quiet| quiet >= ttl) {
                idle.push(session.id().to_string());
            }
        }
        idle
    }

    /// Number of live sessions.
    pub async fn count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Id and creation time of each live session, oldest first.
    pub async fn summary(&self) -> Vec<serde_json::Value> {
        let sessions = self.sessions.lock().await;
        let mut entries: Vec<&Arc<Session>> = sessions.values().collect();
        entries.sort_by_key(|s| s.created_at());
        entries
            .into_iter()
            .map(|s| {
                serde_json::json!({
                    "id": s.id(),
                    "createdAt": s.created_at().to_rfc3339(),
                })
            })
            .collect()
    }

    /// Close every session, e.g. on server shutdown.
    pub async fn close_all(&self) {
        let drained: Vec<Arc<Session>> = self.sessions.lock().await.drain().map(|(_, s)| s).collect();
        for session in drained {
            session.close().await;
        }
    }
}
