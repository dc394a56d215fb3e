// SPDX-FileCopyrightText: 2026 Pendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./pendo.toml` > `~/.config/pendo/pendo.toml` > `/etc/pendo/pendo.toml`
//! with environment variable overrides via `PENDO_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::PendoConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/pendo/pendo.toml` (system-wide)
/// 3. `~/.config/pendo/pendo.toml` (user XDG config)
/// 4. `./pendo.toml` (local directory)
/// 5. `PENDO_*` environment variables
pub fn load_config() -> Result<PendoConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(PendoConfig::default()))
        .merge(Toml::file("/etc/pendo/pendo.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("pendo/pendo.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("pendo.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<PendoConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(PendoConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<PendoConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(PendoConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `PENDO_STORAGE_DATABASE_PATH` must map
/// to `storage.database_path`, not `storage.database.path`.
fn env_provider() -> Env {
    Env::prefixed("PENDO_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: PENDO_SERVER_BEARER_TOKEN -> "server_bearer_token"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("service_", "service.", 1)
            .replacen("server_", "server.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("chat_", "chat.", 1)
            .replacen("metrics_", "metrics.", 1);
        mapped.into()
    })
}
