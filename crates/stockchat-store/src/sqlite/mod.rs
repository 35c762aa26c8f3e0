//! `SQLite` backend.
//!
//! - **[`connection`]**: `r2d2` pool with WAL mode and foreign keys on every
//!   connection.
//! - **[`migrations`]**: version-tracked schema, embedded at compile time.
//! - **[`row_types`]**: raw rows and their conversion to domain types.
//! - **[`repositories`]**: stateless SQL per table.

pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod row_types;

pub use connection::{ConnectionConfig, ConnectionPool, PooledConnection, new_file, new_in_memory};
pub use migrations::{current_version, latest_version, run_migrations};
