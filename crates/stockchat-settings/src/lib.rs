//! # stockchat-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`StockchatSettings::default()`]
//! 2. **User file**: `~/.stockchat/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `STOCKCHAT_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_settings, load_settings_from_path, resolve_path,
    settings_path, stockchat_home,
};
pub use types::*;

use std::sync::OnceLock;

static SETTINGS: OnceLock<StockchatSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// On first call, loads settings from `~/.stockchat/settings.json` with env
/// var overrides. If loading fails, falls back to compiled defaults.
pub fn get_settings() -> &'static StockchatSettings {
    SETTINGS.get_or_init(|| {
        load_settings().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            StockchatSettings::default()
        })
    })
}

/// Initialize the global settings with a specific value.
///
/// Returns the settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: StockchatSettings) -> std::result::Result<(), StockchatSettings> {
    SETTINGS.set(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let settings = StockchatSettings::default();
        assert_eq!(settings.name, "stockchat");
        assert_eq!(settings.backend.reconnect_delay_ms, 3_000);
        assert_eq!(settings.backend.request_timeout_ms, 120_000);
        assert_eq!(settings.session.user_id, 1);
        assert_eq!(settings.session.page_size, 10);
        assert_eq!(settings.server.port, 3000);
        assert!(settings.client.api_url.is_none());
    }

    #[test]
    fn settings_path_is_under_home() {
        assert!(settings_path().ends_with(".stockchat/settings.json"));
    }
}
