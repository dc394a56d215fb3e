// SPDX-FileCopyrightText: 2026 Pendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pendo - real-time chat core for the student counselling platform.
//!
//! This is the binary entry point for the Pendo service.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod serve;
mod shutdown;

/// Pendo - real-time chat core for the student counselling platform.
#[derive(Parser, Debug)]
#[command(name = "pendo", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the Pendo gateway server.
    Serve {
        /// Explicit config file path (skips the XDG hierarchy).
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the effective configuration as TOML.
    Config,
}

fn load_config(path: Option<&PathBuf>) -> pendo_config::PendoConfig {
    let result = match path {
        Some(p) => pendo_config::load_config_from_path(p)
            .map_err(pendo_config::diagnostic::figment_to_config_errors)
            .and_then(|config| {
                pendo_config::validation::validate_config(&config)?;
                Ok(config)
            }),
        None => pendo_config::load_and_validate(),
    };
    match result {
        Ok(config) => config,
        Err(errors) => {
            pendo_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { config }) => {
            let config = load_config(config.as_ref());
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("pendo serve failed: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::Config) => {
            let config = load_config(None);
            match toml::to_string_pretty(&config) {
                Ok(rendered) => println!("{rendered}"),
                Err(e) => {
                    eprintln!("failed to render config: {e}");
                    std::process::exit(1);
                }
            }
        }
        None => {
            println!("pendo: use --help for available commands");
        }
    }
}

#[cfg(test)]
mod tests {
    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        // Verify jemalloc is the global allocator by advancing the epoch.
        // Only jemalloc supports this -- the system allocator would fail.
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn default_config_renders_as_toml() {
        let config = pendo_config::PendoConfig::default();
        let rendered = toml::to_string_pretty(&config).unwrap();
        assert!(rendered.contains("[service]"));
        assert!(rendered.contains("[server]"));
    }
}
