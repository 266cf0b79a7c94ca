//! # theurgy-store
//!
//! Durable per-(user, persona) conversation history and the runtime admin
//! override tier, both in one `SQLite` database.
//!
//! - [`connection`]: `r2d2` pool with WAL pragmas
//! - [`migrations`]: idempotent schema setup
//! - [`repositories`]: stateless repos, every method takes `&Connection`
//! - [`Store`]: transactional facade used by the runtime
//!
//! ## Crate Position
//!
//! Depends on `theurgy-core`. Depended on by `theurgy-runtime` and the agent.

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod migrations;
pub mod repositories;
pub mod store;

pub use connection::ConnectionConfig;
pub use errors::{Result, StoreError};
pub use repositories::history::AuditReport;
pub use store::{Store, StoreConfig};
