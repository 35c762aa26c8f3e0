//! # stockchat-store
//!
//! `SQLite` persistence for conversations, messages and auth sessions.
//!
//! - **[`sqlite`]**: pool, migrations, row types, repositories
//! - **[`store`]**: [`ChatStore`], the synchronous transactional API
//! - **[`gateway`]**: [`SqliteGateway`] / [`SqliteAuthGateway`], the async
//!   gateway contracts over a shared [`ChatStore`]

#![deny(unsafe_code)]

pub mod errors;
pub mod gateway;
pub mod sqlite;
pub mod store;

pub use errors::{Result, StoreError};
pub use gateway::{SqliteAuthGateway, SqliteGateway};
pub use store::{ChatStore, SESSION_TTL_DAYS};
