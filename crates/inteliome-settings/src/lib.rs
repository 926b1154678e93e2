//! # inteliome-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`InteliomeSettings::default()`]
//! 2. **User file**: `~/.inteliome/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `INTELIOME_*` overrides (highest priority)
//!
//! The loaded value is passed down explicitly; there is no global cache.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
