//! Satellite Agent - Entry Point
//!
//! Runs on a compute host next to the container runtime, executes tasks
//! queued by the control plane and gates inference traffic to the model
//! containers it starts.

use std::collections::HashMap;
use std::env;

use anyhow::Context;
use satellite_agent::app::options::AppOptions;
use satellite_agent::app::run::run;
use satellite_agent::logs::{init_logging, LogOptions};
use satellite_agent::storage::layout::StorageLayout;
use satellite_agent::storage::settings::Settings;
use satellite_agent::utils::version_info;

use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", version.version),
        }
        return;
    }

    let layout = match cli_args.get("config-dir") {
        Some(dir) => StorageLayout::new(dir),
        None => StorageLayout::default(),
    };

    let (options, _log_guard) = match bootstrap(layout).await {
        Ok(bootstrapped) => bootstrapped,
        Err(e) => {
            eprintln!("Failed to start the satellite agent: {:#}", e);
            std::process::exit(1);
        }
    };

    info!("Running satellite agent {} with options: {:?}", version.version, options);
    if let Err(e) = run(options, await_shutdown_signal()).await {
        error!("Failed to run the agent: {e}");
        std::process::exit(1);
    }
}

/// Load settings, apply environment overrides and start logging
async fn bootstrap(layout: StorageLayout) -> anyhow::Result<(AppOptions, Option<WorkerGuard>)> {
    let settings_file = layout.settings_file();
    let mut settings = Settings::load(&settings_file)
        .await
        .with_context(|| format!("reading {}", settings_file.path().display()))?;
    settings
        .apply_env(|name| env::var(name).ok())
        .context("applying environment overrides")?;
    settings.validate().context("validating settings")?;

    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.log_json,
        log_dir: settings.log_to_file.then(|| layout.logs_dir()),
        ..Default::default()
    };
    let guard = init_logging(log_options).context("initializing logging")?;

    let options = AppOptions::from_settings(settings, layout)?;
    Ok((options, guard))
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            _ => {
                error!("Unable to install signal handlers, falling back to Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Ctrl+C received, shutting down...");
    }
}
