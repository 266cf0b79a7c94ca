//! Stateless repositories. Every method takes `&Connection` so callers can
//! compose them inside a single transaction.

pub mod history;
pub mod overrides;
