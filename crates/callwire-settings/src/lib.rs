//! # callwire-settings
//!
//! Configuration for the relay server. Values are layered: compiled
//! defaults, then a JSON settings file, then environment variables.

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_from_path, settings_path};
pub use types::{
    AuthSettings, CallwireSettings, CorsSettings, DatabaseSettings, LoggingSettings,
    ServerSettings,
};
