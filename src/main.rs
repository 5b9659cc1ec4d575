use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use claude_monitor::config::{Config, Settings};
use claude_monitor::web::WebServer;
use claude_monitor_core::credential::CredentialSupplier;
use claude_monitor_core::usage::{fetch_once, ClaudeWebClient, FetchCoordinator, FetchError};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Config::parse_args();

    // Setup logging
    setup_logging(cli.debug);

    // Load settings
    let mut settings = Settings::load(cli.config.as_ref())?;
    settings.merge_cli(&cli);
    settings.validate();

    if cli.is_fetch_mode() {
        return fetch(&settings).await;
    }
    serve(settings).await
}

/// Serve the usage API behind the caching coordinator
async fn serve(settings: Settings) -> Result<()> {
    let credentials = settings.credential_supplier();
    tracing::info!(
        "Session credential loaded: {}",
        if credentials.credential().is_some() {
            "YES"
        } else {
            "NO"
        }
    );

    let coordinator = FetchCoordinator::new(
        Arc::new(ClaudeWebClient::new(settings.client_config())),
        Arc::new(credentials),
        settings.coordinator_config(),
    );

    WebServer::new(settings.server, coordinator).run().await
}

/// Fetch once without caching and print the snapshot as JSON
async fn fetch(settings: &Settings) -> Result<()> {
    let credential = settings.credential_supplier().credential();
    let client = ClaudeWebClient::new(settings.client_config());

    let result = match credential {
        Some(credential) => {
            tokio::task::spawn_blocking(move || fetch_once(&client, &credential))
                .await
                .context("Fetch task failed")?
        }
        None => Err(FetchError::CredentialMissing),
    };

    match result {
        Ok(snapshot) => {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Usage fetch failed status={} error={}", e.http_status(), e);
            if e.is_auth_failure() {
                bail!("Authentication failed - check the session cookie: {}", e);
            }
            Err(e.into())
        }
    }
}

fn setup_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("claude_monitor=debug,claude_monitor_core=debug")
    } else {
        EnvFilter::new("claude_monitor=info,claude_monitor_core=info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
