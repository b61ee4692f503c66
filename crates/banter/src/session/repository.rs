//! Session database repository.

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use super::models::{ConversationTurn, Role, Session, Thread};

/// Repository for session persistence.
#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

const SESSION_COLUMNS: &str = "id, user_id, name, personality, is_pinned, \
     document_filename, document_summary, created_at, updated_at";

impl SessionRepository {
    /// Create a new repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new session row.
    pub async fn create(&self, session: &Session) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (
                id, user_id, name, personality, is_pinned,
                document_filename, document_summary, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.name)
        .bind(session.personality.to_string())
        .bind(session.is_pinned)
        .bind(&session.document_filename)
        .bind(&session.document_summary)
        .bind(&session.created_at)
        .bind(&session.updated_at)
        .execute(&self.pool)
        .await
        .context("creating session")?;

        Ok(())
    }

    /// Get a session by ID.
    pub async fn get(&self, id: &str) -> Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("fetching session")?;

        Ok(session)
    }

    /// List sessions for a user, most recently written first.
    pub async fn list(&self, user_id: &str) -> Result<Vec<Session>> {
        let sessions = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE user_id = ? ORDER BY updated_at DESC, created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("listing sessions")?;

        Ok(sessions)
    }

    /// Rename a session.
    pub async fn rename(&self, id: &str, name: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE sessions SET name = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(name)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("renaming session")?;

        Self::require_found(result.rows_affected(), id)
    }

    /// Set the personality tag.
    pub async fn set_personality(&self, id: &str, personality: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE sessions SET personality = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(personality)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("setting session personality")?;

        Self::require_found(result.rows_affected(), id)
    }

    /// Pin or unpin a session.
    pub async fn set_pinned(&self, id: &str, pinned: bool) -> Result<()> {
        let result = sqlx::query("UPDATE sessions SET is_pinned = ? WHERE id = ?")
            .bind(pinned)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("pinning session")?;

        Self::require_found(result.rows_affected(), id)
    }

    /// Attach an auxiliary document, clearing the previous document thread.
    pub async fn set_document(&self, id: &str, filename: &str, summary: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.context("starting transaction")?;

        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET document_filename = ?, document_summary = ?, updated_at = datetime('now')
            WHERE id = ?
            "#,
        )
        .bind(filename)
        .bind(summary)
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("setting session document")?;

        Self::require_found(result.rows_affected(), id)?;

        sqlx::query("DELETE FROM messages WHERE session_id = ? AND thread = 'document'")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("clearing document thread")?;

        tx.commit().await.context("committing transaction")?;
        Ok(())
    }

    /// Replace one thread's turn sequence with the given full sequence.
    ///
    /// This is a full-sequence overwrite keyed by session id, not a delta
    /// append: the caller sends the complete sequence it believes should
    /// exist and the last write wins. The delete and inserts run in one
    /// transaction so a replace is never observed half-applied.
    pub async fn replace_messages(
        &self,
        id: &str,
        thread: Thread,
        turns: &[ConversationTurn],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.context("starting transaction")?;

        let result = sqlx::query("UPDATE sessions SET updated_at = datetime('now') WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("touching session")?;

        Self::require_found(result.rows_affected(), id)?;

        sqlx::query("DELETE FROM messages WHERE session_id = ? AND thread = ?")
            .bind(id)
            .bind(thread.to_string())
            .execute(&mut *tx)
            .await
            .context("clearing thread")?;

        for (seq, turn) in turns.iter().enumerate() {
            sqlx::query(
                "INSERT INTO messages (session_id, thread, seq, role, content) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(id)
            .bind(thread.to_string())
            .bind(seq as i64)
            .bind(turn.role.to_string())
            .bind(&turn.content)
            .execute(&mut *tx)
            .await
            .context("inserting turn")?;
        }

        tx.commit().await.context("committing transaction")?;
        Ok(())
    }

    /// Get one thread's turn sequence, in insertion order.
    pub async fn get_messages(&self, id: &str, thread: Thread) -> Result<Vec<ConversationTurn>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT role, content FROM messages WHERE session_id = ? AND thread = ? ORDER BY seq ASC",
        )
        .bind(id)
        .bind(thread.to_string())
        .fetch_all(&self.pool)
        .await
        .context("fetching turns")?;

        rows.into_iter()
            .map(|(role, content)| {
                let role: Role = role
                    .parse()
                    .map_err(|e: String| anyhow::anyhow!(e))
                    .context("parsing stored role")?;
                Ok(ConversationTurn { role, content })
            })
            .collect()
    }

    /// Delete a session and all of its turns.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.context("starting transaction")?;

        sqlx::query("DELETE FROM messages WHERE session_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("deleting session turns")?;

        let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("deleting session")?;

        Self::require_found(result.rows_affected(), id)?;

        tx.commit().await.context("committing transaction")?;
        Ok(())
    }

    fn require_found(rows_affected: u64, id: &str) -> Result<()> {
        if rows_affected == 0 {
            anyhow::bail!("session not found: {}", id);
        }
        Ok(())
    }
}
