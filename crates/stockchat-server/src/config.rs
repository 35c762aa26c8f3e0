//! Server configuration.

use serde::{Deserialize, Serialize};
use stockchat_settings::StockchatSettings;

/// Configuration for the REST server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (`0` picks a free port).
    pub port: u16,
    /// User that unauthenticated requests act for.
    pub default_user_id: i64,
    /// Reject requests without a valid bearer token.
    pub require_auth: bool,
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &StockchatSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            default_user_id: settings.session.user_id,
            require_auth: settings.server.require_auth,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            default_user_id: 1,
            require_auth: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
        assert!(!cfg.require_auth);
    }

    #[test]
    fn from_settings_copies_server_block() {
        let mut settings = StockchatSettings::default();
        settings.server.port = 8080;
        settings.server.require_auth = true;
        settings.session.user_id = 7;
        let cfg = ServerConfig::from_settings(&settings);
        assert_eq!(cfg.port, 8080);
        assert!(cfg.require_auth);
        assert_eq!(cfg.default_user_id, 7);
    }
}
