//! # stockchat-server
//!
//! Axum REST server over the persistence and auth gateways.
//!
//! - `/api/conversations` routes: create, list, rename, delete, message
//!   pages, message upsert, feedback
//! - `/api/auth` routes: current user, logout
//! - `/health`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod routes;
pub mod server;

pub use config::ServerConfig;
pub use errors::ApiError;
pub use server::{AppState, SHUTDOWN_TIMEOUT, StockchatServer};
