// SPDX-FileCopyrightText: 2026 Pendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation of the configuration.
//!
//! Figment guarantees shape and types; these checks enforce value-level
//! constraints that serde cannot express.

use crate::diagnostic::ConfigError;
use crate::model::PendoConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized config, collecting every problem instead of
/// stopping at the first.
pub fn validate_config(config: &PendoConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.service.log_level.as_str()) {
        errors.push(ConfigError::with_help(
            format!(
                "service.log_level: unknown level {:?}",
                config.service.log_level
            ),
            format!("expected one of: {}", LOG_LEVELS.join(", ")),
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::with_help(
            "storage.database_path: must not be empty",
            "point this at a writable SQLite file path, e.g. \"pendo.db\"",
        ));
    }

    if config.chat.room_buffer == 0 {
        errors.push(ConfigError::with_help(
            "chat.room_buffer: must be at least 1",
            "the broadcast buffer bounds how far a slow subscriber may lag",
        ));
    }

    if config.chat.stale_session_minutes > 0 && config.chat.sweep_interval_secs == 0 {
        errors.push(ConfigError::with_help(
            "chat.sweep_interval_secs: must be at least 1 when the inactivity sweeper is enabled",
            "set chat.stale_session_minutes = 0 to disable sweeping instead",
        ));
    }

    if let Some(token) = &config.server.bearer_token {
        if token.len() < 16 {
            errors.push(ConfigError::with_help(
                "server.bearer_token: too short",
                "use at least 16 characters; this token gates every /v1 route",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = PendoConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn bad_log_level_is_rejected() {
        let mut config = PendoConfig::default();
        config.service.log_level = "loud".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("log_level"));
    }

    #[test]
    fn short_bearer_token_is_rejected() {
        let mut config = PendoConfig::default();
        config.server.bearer_token = Some("short".to_string());
        let errors = validate_config(&config).unwrap_err();
        assert!(errors[0].message.contains("bearer_token"));
    }

    #[test]
    fn sweeper_without_interval_is_rejected() {
        let mut config = PendoConfig::default();
        config.chat.stale_session_minutes = 30;
        config.chat.sweep_interval_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn multiple_problems_are_all_collected() {
        let mut config = PendoConfig::default();
        config.service.log_level = "loud".to_string();
        config.storage.database_path = " ".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
