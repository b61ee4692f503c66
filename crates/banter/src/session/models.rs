//! Session data models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::persona::Personality;

/// Role of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Input typed by the person.
    User,
    /// A committed generated answer.
    Assistant,
    /// Instructions (persona prompt, upload notices).
    System,
    /// A failed exchange, kept visible in history.
    Error,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
            Role::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            "error" => Ok(Role::Error),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

// Implement conversion from String for SQLx
impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, String> {
        value.parse()
    }
}

/// Which turn sequence of a session a message belongs to.
///
/// The main conversation and the document Q&A thread are disjoint; merging
/// them for display is a projection done by callers, never by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Thread {
    Main,
    Document,
}

impl std::fmt::Display for Thread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Thread::Main => write!(f, "main"),
            Thread::Document => write!(f, "document"),
        }
    }
}

/// One immutable turn of a conversation. Ordering is insertion order and is
/// replayed as dialogue history on every subsequent request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::new(Role::Error, content)
    }
}

/// A durable conversation session.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    /// Unique session ID.
    pub id: String,
    /// Owning identity ("default" in single-user use).
    pub user_id: String,
    /// Display name.
    pub name: String,
    /// Active personality tag.
    #[sqlx(try_from = "String")]
    pub personality: Personality,
    /// Whether the session is pinned in listings.
    pub is_pinned: bool,
    /// Filename of the uploaded auxiliary document, if any.
    pub document_filename: Option<String>,
    /// Extracted summary of the auxiliary document, if any.
    pub document_summary: Option<String>,
    /// When the session was created.
    pub created_at: String,
    /// When the session was last written.
    pub updated_at: String,
}

impl Session {
    /// The auxiliary document context, when one has been ingested.
    pub fn document(&self) -> Option<DocumentContext> {
        match (&self.document_filename, &self.document_summary) {
            (Some(filename), Some(summary)) => Some(DocumentContext {
                filename: filename.clone(),
                summary: summary.clone(),
            }),
            _ => None,
        }
    }
}

/// Auxiliary document context attached to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentContext {
    pub filename: String,
    pub summary: String,
}

/// A session together with both of its turn sequences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: Session,
    /// Main conversation turns, in insertion order.
    pub messages: Vec<ConversationTurn>,
    /// Document Q&A turns, in insertion order.
    pub document_messages: Vec<ConversationTurn>,
}

/// Request to create a new session.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub personality: Option<Personality>,
}

/// Request to rename and/or pin a session.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSessionRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_pinned: Option<bool>,
}
