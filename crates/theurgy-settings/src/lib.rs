//! # theurgy-settings
//!
//! Configuration with layered sources.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`TheurgySettings::default()`]
//! 2. **User file**: `~/.theurgy/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `THEURGY_*` overrides (highest priority)
//!
//! Persona definitions are a separate JSON document read by
//! [`definitions::load_definitions`].
//!
//! ## Crate Position
//!
//! Depends on `theurgy-core`. Depended on by the store, generation, runtime
//! and agent crates.

#![deny(unsafe_code)]

pub mod definitions;
pub mod errors;
pub mod loader;
pub mod types;

pub use definitions::{load_definitions, parse_definitions};
pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
