//! Session state store module.
//!
//! The only owner of durable conversation state. Mutation happens through
//! `SessionService` operations; nothing else touches the rows.

mod models;
mod repository;
mod service;

pub use models::{
    ConversationTurn, CreateSessionRequest, DocumentContext, Role, Session, SessionDetail,
    Thread, UpdateSessionRequest,
};
pub use repository::SessionRepository;
pub use service::SessionService;
