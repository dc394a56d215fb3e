// SPDX-FileCopyrightText: 2026 Pendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Diagnostic error rendering for configuration failures.
//!
//! Wraps figment/validation failures in miette diagnostics so startup
//! errors point at the offending key with a help line instead of dumping
//! a serde trace.

use miette::Diagnostic;
use std::fmt;

/// A single configuration problem, renderable as a miette diagnostic.
#[derive(Debug, Diagnostic)]
#[diagnostic(code(pendo::config))]
pub struct ConfigError {
    /// Human-readable description of the problem.
    pub message: String,
    /// Suggested fix, shown as the diagnostic help line.
    #[help]
    pub help: Option<String>,
}

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            help: None,
        }
    }

    pub fn with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Convert a figment extraction error into config diagnostics.
///
/// Figment reports the failing key path in its metadata; we surface it
/// with an env-var hint since most deploy-time mistakes are override typos.
pub fn figment_to_config_errors(err: figment::Error) -> Vec<ConfigError> {
    err.into_iter()
        .map(|e| {
            let path = e.path.join(".");
            if path.is_empty() {
                ConfigError::new(e.kind.to_string())
            } else {
                ConfigError::with_help(
                    format!("{path}: {}", e.kind),
                    format!(
                        "check `{path}` in pendo.toml or the PENDO_{} environment variable",
                        path.replace('.', "_").to_uppercase()
                    ),
                )
            }
        })
        .collect()
}

/// Print diagnostics to stderr in miette's fancy format.
pub fn render_errors(errors: &[ConfigError]) {
    for err in errors {
        let report = miette::Report::new(ConfigError {
            message: err.message.clone(),
            help: err.help.clone(),
        });
        eprintln!("{report:?}");
    }
}
