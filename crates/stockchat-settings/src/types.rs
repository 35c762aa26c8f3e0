//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a partial
//! JSON file fills in the rest from [`Default`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root settings type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StockchatSettings {
    /// Settings schema version.
    pub version: String,
    /// Application name.
    pub name: String,
    /// Inference backend connection.
    pub backend: BackendSettings,
    /// Chat session behaviour.
    pub session: SessionSettings,
    /// REST server.
    pub server: ServerSettings,
    /// Terminal client.
    pub client: ClientSettings,
    /// Logging.
    pub logging: LoggingSettings,
}

impl Default for StockchatSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            name: "stockchat".to_string(),
            backend: BackendSettings::default(),
            session: SessionSettings::default(),
            server: ServerSettings::default(),
            client: ClientSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Inference backend connection settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendSettings {
    /// Base endpoint; the chat socket path is appended.
    pub llm_endpoint: String,
    /// Delay before reconnecting after the socket closes.
    pub reconnect_delay_ms: u64,
    /// Time a single request may wait for its terminal frame.
    pub request_timeout_ms: u64,
}

impl BackendSettings {
    /// Reconnect delay as a [`Duration`].
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            llm_endpoint: "http://localhost:8000".to_string(),
            reconnect_delay_ms: 3_000,
            request_timeout_ms: 120_000,
        }
    }
}

/// Chat session settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// User id sent with every outbound frame.
    pub user_id: i64,
    /// Pause before a confirmation question is surfaced.
    pub question_delay_ms: u64,
    /// History page size.
    pub page_size: u32,
    /// Client-local state file (relative to `~/.stockchat`).
    pub state_file: String,
}

impl SessionSettings {
    /// Question delay as a [`Duration`].
    pub fn question_delay(&self) -> Duration {
        Duration::from_millis(self.question_delay_ms)
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            user_id: 1,
            question_delay_ms: 100,
            page_size: 10,
            state_file: "client-state.json".to_string(),
        }
    }
}

/// REST server settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// SQLite database path (relative to `~/.stockchat`).
    pub db_path: String,
    /// Reject requests without a valid bearer token.
    pub require_auth: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            db_path: "stockchat.db".to_string(),
            require_auth: false,
        }
    }
}

/// Terminal client settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// REST server base URL. When unset the client opens the database
    /// directly.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    /// Bearer token presented to the REST server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let s: StockchatSettings =
            serde_json::from_str(r#"{"backend": {"reconnectDelayMs": 500}}"#).unwrap();
        assert_eq!(s.backend.reconnect_delay(), Duration::from_millis(500));
        assert_eq!(s.backend.request_timeout_ms, 120_000);
        assert_eq!(s.session.user_id, 1);
    }

    #[test]
    fn serializes_camel_case() {
        let v = serde_json::to_value(StockchatSettings::default()).unwrap();
        assert_eq!(v["backend"]["llmEndpoint"], "http://localhost:8000");
        assert_eq!(v["session"]["questionDelayMs"], 100);
        assert!(v["client"].get("apiUrl").is_none());
    }
}
