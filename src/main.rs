//! site-admin command-line entry point

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use site_admin::analytics::AnalyticsEvent;
use site_admin::cli::{execute, Cli};
use site_admin::config::{AdminConfig, BackendConfig};
use site_admin::notify::ChannelNotifier;
use site_admin::AdminApp;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let (mut config, source) = match AdminConfig::load_or_default(&cli.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let log_dir = cli.log_dir.clone().unwrap_or_else(|| config.log_dir.clone());
    if let Err(e) = rolling_logger::init_logger(log_dir, "site-admin") {
        eprintln!("Warning: file logging disabled: {e}");
    }
    log::info!("{}", source);

    config.apply_env();
    if cli.memory {
        log::info!("--memory given, using the in-memory store");
        config.backend = BackendConfig::Memory;
    }

    let (notifier, mut notes) = ChannelNotifier::channel();
    let app = match AdminApp::open(config, Arc::new(notifier)).await {
        Ok(app) => app,
        Err(e) => {
            log::error!("Failed to open backend: {}", e);
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match app.manager(&cli.scope) {
        Ok(manager) => execute(&manager, &cli.command).await.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    while let Ok(note) = notes.try_recv() {
        eprintln!("{note}");
    }

    let event = AnalyticsEvent::new("admin_action")
        .with_page(format!("admin/{}", cli.scope))
        .with_property("scope", cli.scope.as_str())
        .with_property("command", cli.command.name())
        .with_property("ok", result.is_ok());
    app.track(event).await;

    match result {
        Ok(lines) => {
            let _ = rolling_logger::info(&format!("{} {} done", cli.scope, cli.command.name()));
            for line in lines {
                println!("{line}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            let _ = rolling_logger::error(&format!("{} {} failed: {}", cli.scope, cli.command.name(), e));
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
