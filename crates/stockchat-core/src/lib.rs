//! # stockchat-core
//!
//! Foundation types shared by every stockchat crate.
//!
//! - **Branded IDs**: `ConversationId`, `MessageId`, `RequestId` newtypes
//! - **Messages**: [`messages::Message`] with orthogonal `kind` and `feedback`
//!   fields, collapsed to the legacy `role` encoding only on the wire
//! - **Trading actions**: loosely typed wire payload plus a strict validator
//! - **Protocol**: outbound/inbound frames for the inference backend socket
//! - **Gateways**: async contracts for persistence and auth collaborators
//! - **Errors**: `thiserror` hierarchy for gateway and auth failures
//! - **Logging**: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod constants;
pub mod conversation;
pub mod errors;
pub mod gateway;
pub mod ids;
pub mod logging;
pub mod messages;
pub mod protocol;
pub mod trading;

pub use conversation::{Conversation, ConversationSummary, MessagePage};
pub use errors::{AuthError, GatewayError};
pub use gateway::{AuthGateway, PersistenceGateway};
pub use ids::{ConversationId, MessageId, RequestId};
pub use messages::{FeedbackState, Message, MessageKind, Role, Subgraph};
pub use protocol::{InboundFrame, OutboundFrame};
pub use trading::{OrderSide, TradingAction, TradingActionError, ValidatedOrder};
