//! # relay-settings
//!
//! Layered settings for the relay daemon.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RelaySettings::default()`]
//! 2. **Settings file**: `~/.relay/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `RELAY_*` overrides (highest priority)
//!
//! The loaded value is validated and handed to whoever needs it; there is no
//! process-wide settings singleton.
//!
//! # Usage
//!
//! ```no_run
//! let settings = relay_settings::load_settings().unwrap_or_default();
//! println!("listening on {}:{}", settings.server.host, settings.server.port);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, load_with_env, settings_path};
pub use types::{HubSettings, LoggingSettings, RelaySettings, ServerSettings};
