//! Settings schema. Serialized camelCase to match the JSON settings file.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CallwireSettings {
    pub server: ServerSettings,
    pub auth: AuthSettings,
    pub database: DatabaseSettings,
    pub cors: CorsSettings,
    pub logging: LoggingSettings,
}

impl CallwireSettings {
    /// Check invariants that defaults alone cannot satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.auth.secret().is_none() {
            return Err(SettingsError::InvalidValue(
                "auth.jwtSecret is not set (set JWT_SECRET)".into(),
            ));
        }
        if self.server.send_queue_size == 0 {
            return Err(SettingsError::InvalidValue(
                "server.sendQueueSize must be at least 1".into(),
            ));
        }
        if self.server.heartbeat_interval_secs > 0
            && self.server.heartbeat_timeout_secs < self.server.heartbeat_interval_secs
        {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatTimeoutSecs must not be shorter than the interval".into(),
            ));
        }
        Ok(())
    }
}

/// Listener and per-connection transport settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Capacity of each connection's outbound queue.
    pub send_queue_size: usize,
    /// How long a relay waits on a full recipient queue before giving up.
    pub send_timeout_ms: u64,
    /// Ping interval. `0` disables the liveness heartbeat.
    pub heartbeat_interval_secs: u64,
    /// Close the connection after this long without a pong.
    pub heartbeat_timeout_secs: u64,
    /// Grace period for open sessions during shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            max_message_size: 1024 * 1024,
            send_queue_size: 256,
            send_timeout_ms: 5_000,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            shutdown_timeout_secs: 10,
        }
    }
}

/// Bearer-credential verification.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    pub jwt_secret: Option<String>,
    pub jwt_algorithm: String,
}

impl AuthSettings {
    /// The configured secret, ignoring blank values.
    pub fn secret(&self) -> Option<&str> {
        self.jwt_secret
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_algorithm: "HS256".into(),
        }
    }
}

impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSettings")
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "<redacted>"))
            .field("jwt_algorithm", &self.jwt_algorithm)
            .finish()
    }
}

/// Call-session bookkeeping database.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseSettings {
    /// SQLite file path. `~/` is expanded against `$HOME`.
    pub path: String,
    /// Record call sessions at all.
    pub call_tracking: bool,
}

impl DatabaseSettings {
    pub fn resolved_path(&self) -> std::path::PathBuf {
        match self.path.strip_prefix("~/") {
            Some(rest) => crate::loader::home_dir().join(rest),
            None => std::path::PathBuf::from(&self.path),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: "~/.callwire/callwire.db".into(),
            call_tracking: true,
        }
    }
}

/// Browser origins allowed to call the HTTP endpoints.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CorsSettings {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "http://localhost:3000".into(),
                "http://127.0.0.1:3000".into(),
            ],
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive. `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}
