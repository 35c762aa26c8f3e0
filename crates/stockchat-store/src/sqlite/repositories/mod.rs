//! Stateless repositories. Each method takes `&Connection` and runs SQL.

pub mod auth_session;
pub mod conversation;
pub mod message;

pub use auth_session::AuthSessionRepo;
pub use conversation::ConversationRepo;
pub use message::MessageRepo;
