//! # aqua-settings
//!
//! Configuration for the aqua console session layer.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`AquaSettings::default()`]
//! 2. **User file**: `~/.aqua/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `AQUA_*` overrides (highest priority)
//!
//! There is no global instance: the binary loads settings once and hands the
//! relevant sections to each component.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{aqua_home, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
