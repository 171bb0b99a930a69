//! In-memory chat sessions
//!
//! Each browser tab (or API client) gets its own `ChatSession` keyed by an
//! opaque id. Sessions live only in memory and are dropped after 30 minutes
//! without activity.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use buddy_core::{ChatMessage, ChatSession, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

/// Session timeout (30 minutes of inactivity)
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Maximum transcript messages kept per session
pub const MAX_TRANSCRIPT_MESSAGES: usize = 50;

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
struct SessionEntry {
    created_at: DateTime<Utc>,
    last_activity: Instant,
    chat: ChatSession,
}

impl SessionEntry {
    fn new() -> Self {
        Self {
            created_at: Utc::now(),
            last_activity: Instant::now(),
            chat: ChatSession::new(),
        }
    }

    fn is_expired(&self) -> bool {
        self.last_activity.elapsed() > SESSION_TIMEOUT
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    fn view(&self, session_id: &str) -> SessionView {
        SessionView {
            session_id: session_id.to_string(),
            created_at: self.created_at,
            income: self.chat.income,
            transcript: self.chat.transcript().to_vec(),
        }
    }
}

/// What the API returns for a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub income: Option<f64>,
    pub transcript: Vec<ChatMessage>,
}

/// Session store shared by all handlers
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session and return its view
    pub async fn create(&self) -> SessionView {
        let session_id = new_session_id();
        let entry = SessionEntry::new();
        let view = entry.view(&session_id);

        let mut sessions = self.sessions.write().await;
        // Expired sessions are swept whenever a new one starts
        sessions.retain(|_, s| !s.is_expired());
        sessions.insert(session_id, entry);
        view
    }

    /// Current state of a live session
    pub async fn get(&self, session_id: &str) -> Option<SessionView> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .filter(|s| !s.is_expired())
            .map(|s| s.view(session_id))
    }

    /// Income recorded for a live session (outer `None` = no such session)
    pub async fn income(&self, session_id: &str) -> Option<Option<f64>> {
        let mut sessions = self.sessions.write().await;
        let entry = live_entry(&mut sessions, session_id)?;
        entry.touch();
        Some(entry.chat.income)
    }

    /// Set the income; `Ok(None)` when the session does not exist
    pub async fn set_income(&self, session_id: &str, income: f64) -> Result<Option<SessionView>> {
        let mut sessions = self.sessions.write().await;
        let Some(entry) = live_entry(&mut sessions, session_id) else {
            return Ok(None);
        };
        entry.chat.set_income(income)?;
        entry.touch();
        Ok(Some(entry.view(session_id)))
    }

    /// Append a finished turn, trimming the oldest messages past the cap
    pub async fn record_turn(
        &self,
        session_id: &str,
        user: &str,
        assistant: &str,
    ) -> Option<SessionView> {
        let mut sessions = self.sessions.write().await;
        let entry = live_entry(&mut sessions, session_id)?;
        entry.chat.record(user, assistant);
        entry.chat.truncate_front(MAX_TRANSCRIPT_MESSAGES);
        entry.touch();
        Some(entry.view(session_id))
    }

    pub async fn delete(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_id).is_some()
    }

    pub async fn len(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.values().filter(|s| !s.is_expired()).count()
    }
}

fn live_entry<'a>(
    sessions: &'a mut HashMap<String, SessionEntry>,
    session_id: &str,
) -> Option<&'a mut SessionEntry> {
    sessions.get_mut(session_id).filter(|s| !s.is_expired())
}

fn new_session_id() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let counter = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);

    let mut hasher = Sha256::new();
    hasher.update(timestamp.to_le_bytes());
    hasher.update(counter.to_le_bytes());
    hasher.update(std::process::id().to_le_bytes());
    let hash = hasher.finalize();
    format!("chat_{:x}", hash)[..24].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use buddy_core::ChatRole;

    #[tokio::test]
    async fn test_session_lifecycle() {
        let manager = SessionManager::new();
        let created = manager.create().await;
        assert!(created.session_id.starts_with("chat_"));
        assert_eq!(created.session_id.len(), 24);
        assert!(created.transcript.is_empty());

        let view = manager
            .set_income(&created.session_id, 3200.0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(view.income, Some(3200.0));
        assert_eq!(manager.income(&created.session_id).await, Some(Some(3200.0)));

        assert!(manager.delete(&created.session_id).await);
        assert!(manager.get(&created.session_id).await.is_none());
        assert!(!manager.delete(&created.session_id).await);
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let manager = SessionManager::new();
        let a = manager.create().await;
        let b = manager.create().await;
        assert_ne!(a.session_id, b.session_id);
        assert_eq!(manager.len().await, 2);
    }

    #[tokio::test]
    async fn test_negative_income_rejected() {
        let manager = SessionManager::new();
        let id = manager.create().await.session_id;
        assert!(manager.set_income(&id, -5.0).await.is_err());
        assert_eq!(manager.income(&id).await, Some(None));
        assert!(manager.set_income("chat_missing", 5.0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transcript_capped() {
        let manager = SessionManager::new();
        let id = manager.create().await.session_id;

        for i in 0..30 {
            manager
                .record_turn(&id, &format!("q{}", i), &format!("a{}", i))
                .await
                .unwrap();
        }

        let view = manager.get(&id).await.unwrap();
        assert_eq!(view.transcript.len(), MAX_TRANSCRIPT_MESSAGES);
        assert_eq!(view.transcript[0].role, ChatRole::User);
        assert_eq!(view.transcript[0].content, "q5");
        assert_eq!(view.transcript.last().unwrap().content, "a29");
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let manager = SessionManager::new();
        assert!(manager.get("chat_nope").await.is_none());
        assert!(manager.income("chat_nope").await.is_none());
        assert!(manager.record_turn("chat_nope", "q", "a").await.is_none());
    }
}
