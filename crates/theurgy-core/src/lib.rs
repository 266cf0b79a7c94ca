//! # theurgy-core
//!
//! Foundation types shared by every theurgy crate:
//!
//! - **IDs**: [`ids::UserId`], [`ids::PersonaId`], [`ids::SessionId`] as newtypes
//! - **History**: [`history::Speaker`], [`history::HistoryEntry`] and the
//!   [`history::AuditRecord`] sum type written for command audits
//! - **Personas**: [`persona::PersonaDefinition`], [`persona::PersonaPolicy`],
//!   [`persona::JudgmentTier`] and the runtime override keys
//! - **Text**: UTF-8 safe truncation used for log previews
//! - **Logging**: [`logging::init_subscriber`]
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other theurgy crates.

#![deny(unsafe_code)]

pub mod history;
pub mod ids;
pub mod logging;
pub mod persona;
pub mod text;
