//! # stockchat-client
//!
//! The realtime chat session layer.
//!
//! - **[`connection`]**: [`ConnectionManager`], the actor owning the single
//!   WebSocket to the inference backend
//! - **[`correlator`]**: [`Correlator`], one logical request over that socket
//!   with cumulative-frame diffing and interim/terminal detection
//! - **[`controller`]**: [`SessionController`], conversation identity, chat
//!   turns, the trading confirmation round trip, history
//! - **[`storage`]**: client-local key/value storage
//! - **[`http_gateway`]**: [`HttpGateway`], the persistence gateway over REST

#![deny(unsafe_code)]

pub mod connection;
pub mod controller;
pub mod correlator;
pub mod errors;
pub mod http_gateway;
pub mod storage;

pub use connection::{ConnectionHandle, ConnectionManager, ConnectionState, FrameSink};
pub use controller::{ChatEvent, SessionConfig, SessionController};
pub use correlator::{ChatRequest, ChunkFn, Correlator, Dispatcher, PendingRequest, new_suffix};
pub use errors::{ClientError, ConnectionError};
pub use http_gateway::HttpGateway;
pub use storage::{FileStorage, LocalStorage, MemoryStorage};
