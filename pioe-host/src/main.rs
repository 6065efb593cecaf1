//! # pioe-host
//!
//! Command-line host for pioe script engines.
//!
//! The host loads engine plugins, initializes them, hands them the scripts
//! named in the configuration or on the command line, and drives the frame
//! loop until interrupted.
//!
//! ## Configuration
//!
//! The host reads configuration from `$XDG_CONFIG_HOME/pioe/config.toml`
//! unless `--config` names another file. A documented default file is
//! created on first run.
//!
//! ## Running
//!
//! ```bash
//! # Run a Ruby script on the ruby engine
//! cargo run --bin pioe-host -- --engine ruby main.rb
//!
//! # With debug logging
//! RUST_LOG=debug cargo run --bin pioe-host -- --engine echo hello.echo
//! ```

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, warn};

use pioe_host::app;
use pioe_host::cli::Cli;
use pioe_host::config::{self, Config};
use pioe_host::logging;
use pioe_runtime::{find_engines, Host};

fn main() -> Result<ExitCode> {
    app::block_on(run(Cli::parse()))?
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let (mut config, fallback) = match &cli.config {
        Some(path) => (Config::load(path)?, None),
        None => match Config::load_default() {
            Ok(cfg) => (cfg, None),
            Err(e) => (Config::default(), Some(e)),
        },
    };
    cli.apply(&mut config);
    config::validate_log_level(&config.host.log_level)?;

    logging::init(&config.host.log_level);
    info!("Starting pioe-host v{}", env!("CARGO_PKG_VERSION"));
    if let Some(e) = fallback {
        warn!("Failed to load config, using defaults: {:#}", e);
    }

    let options = config.host_options();

    if cli.list_engines {
        for engine in find_engines(&options.search) {
            println!("{}\t{}", engine.key, engine.path.display());
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mut host = Host::new(options);
    match app::serve(&mut host, &config).await {
        Ok(()) => {
            info!("pioe-host stopped");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) if e.is_fatal() => {
            error!(kind = ?e.kind(), "Fatal: {}", e);
            Ok(ExitCode::FAILURE)
        }
        Err(e) => {
            error!(kind = ?e.kind(), "{}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}
