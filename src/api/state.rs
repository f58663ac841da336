//! Per-session state for the HTTP MCP transport

use crate::mcp::SessionState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Header carrying the HTTP session id
pub const SESSION_HEADER: &str = "mcp-session-id";

/// One HTTP MCP session
#[derive(Debug, Clone, Serialize)]
pub struct SessionEntry {
    /// Session id handed out by `initialize`
    pub id: String,
    /// Protocol state
    pub state: SessionState,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// Last request seen on the session
    pub last_seen: DateTime<Utc>,
}

/// Registry of HTTP MCP sessions keyed by `Mcp-Session-Id`
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a freshly initialized session, returning its id
    pub async fn create(&self, state: SessionState) -> String {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let now = Utc::now();
        let entry = SessionEntry {
            id: id.clone(),
            state,
            created_at: now,
            last_seen: now,
        };
        self.sessions.write().await.insert(id.clone(), entry);
        id
    }

    /// Protocol state of a session, if it exists
    pub async fn get(&self, id: &str) -> Option<SessionState> {
        let mut sessions = self.sessions.write().await;
        sessions.get_mut(id).map(|entry| {
            entry.last_seen = Utc::now();
            entry.state.clone()
        })
    }

    /// Replace the protocol state of an existing session
    pub async fn update(&self, id: &str, state: SessionState) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(id) {
            Some(entry) => {
                entry.state = state;
                entry.last_seen = Utc::now();
                true
            }
            None => false,
        }
    }

    /// End a session
    pub async fn remove(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    /// Number of live sessions
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop sessions with no request for longer than `max_idle`
    ///
    /// Clients that go away without `DELETE /mcp` are only cleaned up here.
    /// Returns the evicted ids.
    pub async fn prune_idle(&self, max_idle: Duration) -> Vec<String> {
        let Some(cutoff) = chrono::Duration::from_std(max_idle)
            .ok()
            .and_then(|idle| Utc::now().checked_sub_signed(idle))
        else {
            return Vec::new();
        };

        let mut evicted = Vec::new();
        self.sessions.write().await.retain(|id, entry| {
            let keep = entry.last_seen >= cutoff;
            if !keep {
                evicted.push(id.clone());
            }
            keep
        });

        if !evicted.is_empty() {
            info!("Evicted {} idle MCP session(s)", evicted.len());
        }
        evicted
    }

    /// Background task calling [`Self::prune_idle`] periodically
    pub fn spawn_pruner(&self, max_idle: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        let period = (max_idle / 2).max(Duration::from_millis(10));
        debug!("Pruning idle MCP sessions every {:?}", period);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                registry.prune_idle(max_idle).await;
            }
        })
    }
}
