//! Session state service.
//!
//! Owns every mutation of durable conversation state. Callers never touch
//! the underlying rows; they go through these operations, which keep the
//! "full-sequence replace, last write wins" discipline in one place.

use anyhow::Result;
use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::persona::Personality;

use super::models::{ConversationTurn, Role, Session, SessionDetail, Thread};
use super::repository::SessionRepository;

/// Default name for a freshly created session.
const DEFAULT_SESSION_NAME: &str = "New Chat";

/// Service for managing conversation sessions.
#[derive(Debug, Clone)]
pub struct SessionService {
    repo: SessionRepository,
}

impl SessionService {
    /// Create a new service.
    pub fn new(repo: SessionRepository) -> Self {
        Self { repo }
    }

    /// Create a session for the given owner.
    pub async fn create_session(
        &self,
        user_id: &str,
        name: Option<String>,
        personality: Option<Personality>,
    ) -> Result<Session> {
        let now = Utc::now().to_rfc3339();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            name: name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SESSION_NAME.to_string()),
            personality: personality.unwrap_or_default(),
            is_pinned: false,
            document_filename: None,
            document_summary: None,
            created_at: now.clone(),
            updated_at: now,
        };

        self.repo.create(&session).await?;
        Ok(session)
    }

    /// Get a session without its turns.
    pub async fn get_session(&self, id: &str) -> Result<Option<Session>> {
        self.repo.get(id).await
    }

    /// Get a session with both turn threads.
    pub async fn get_session_detail(&self, id: &str) -> Result<Option<SessionDetail>> {
        let Some(session) = self.repo.get(id).await? else {
            return Ok(None);
        };

        let messages = self.repo.get_messages(id, Thread::Main).await?;
        let document_messages = self.repo.get_messages(id, Thread::Document).await?;

        Ok(Some(SessionDetail {
            session,
            messages,
            document_messages,
        }))
    }

    /// List a user's sessions, most recently written first.
    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<Session>> {
        self.repo.list(user_id).await
    }

    /// Replace the main conversation with the given full sequence.
    ///
    /// The store overwrites unconditionally keyed by session id. Two writers
    /// racing on the same session are not reconciled: the last full sequence
    /// wins. A sequence with adjacent assistant turns usually means a caller
    /// committed the same answer twice, so it is logged before being stored.
    pub async fn replace_messages(&self, id: &str, turns: &[ConversationTurn]) -> Result<()> {
        if let Some(position) = adjacent_assistant_turns(turns) {
            warn!(
                session_id = %id,
                position,
                "replacing with adjacent assistant turns; possible double commit"
            );
        }
        self.repo.replace_messages(id, Thread::Main, turns).await
    }

    /// Replace the document Q&A thread with the given full sequence.
    pub async fn replace_document_messages(
        &self,
        id: &str,
        turns: &[ConversationTurn],
    ) -> Result<()> {
        self.repo
            .replace_messages(id, Thread::Document, turns)
            .await
    }

    /// Set the personality tag.
    pub async fn set_personality(&self, id: &str, personality: Personality) -> Result<()> {
        self.repo
            .set_personality(id, &personality.to_string())
            .await
    }

    /// Rename a session.
    pub async fn rename(&self, id: &str, name: &str) -> Result<()> {
        self.repo.rename(id, name).await
    }

    /// Pin or unpin a session.
    pub async fn set_pinned(&self, id: &str, pinned: bool) -> Result<()> {
        self.repo.set_pinned(id, pinned).await
    }

    /// Attach an auxiliary document; its previous Q&A thread is cleared.
    pub async fn set_document(&self, id: &str, filename: &str, summary: &str) -> Result<()> {
        self.repo.set_document(id, filename, summary).await
    }

    /// Delete a session and its turns.
    pub async fn delete_session(&self, id: &str) -> Result<()> {
        self.repo.delete(id).await
    }
}

/// Index of the second of the first pair of adjacent assistant turns, if any.
fn adjacent_assistant_turns(turns: &[ConversationTurn]) -> Option<usize> {
    turns
        .windows(2)
        .position(|pair| pair[0].role == Role::Assistant && pair[1].role == Role::Assistant)
        .map(|i| i + 1)
}
