//! Application entry point for the `tankflow` service.
//!
//! This binary orchestrates the full startup sequence:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Building the registry, push and SMS clients
//! - Starting the ingestion supervisor (one MQTT subscription per
//!   water-level sensor) feeding the alert engine
//! - Binding the Axum HTTP server for analytics queries
//!
//! Ctrl-C cancels every subscription task and drains the HTTP server.
//!
//! # Environment Variables
//! See [`tankflow::config::load_from_env`] for the full list, plus:
//! - `TANKFLOW_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `TANKFLOW_SPAN_EVENTS` (optional) – span event mode for tracing
use std::{env, sync::Arc};

use anyhow::Result;
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use tankflow::alerts::AlertEngine;
use tankflow::ingest::{ReadingSink, Supervisor};
use tankflow::notify::{Dispatcher, Notifier, PushNotifier, SmsNotifier};
use tankflow::registry::{Registry, RegistryClient};
use tankflow::{config, routes};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let http = reqwest::Client::builder()
        .timeout(cfg.http_timeout)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

    let registry: Arc<dyn Registry> =
        Arc::new(RegistryClient::new(http.clone(), &cfg.registry_url));
    let push: Arc<dyn Notifier> = Arc::new(PushNotifier::new(http.clone(), &cfg.push_url));
    let sms: Arc<dyn Notifier> = Arc::new(SmsNotifier::new(http, &cfg.sms_url, cfg.sms.clone()));

    let dispatcher = Dispatcher::new(registry.clone(), push, sms);
    let engine: Arc<dyn ReadingSink> = Arc::new(AlertEngine::new(
        registry.clone(),
        dispatcher,
        cfg.bounds,
        cfg.message_offset,
    ));

    let cancel = CancellationToken::new();
    let supervisor = Supervisor::new(
        registry.clone(),
        engine,
        cfg.mqtt_settings(),
        cfg.reconnect_interval,
    );
    let ingestion = tokio::spawn(supervisor.run(cancel.clone()));

    let addr = cfg.listen_addr;
    let app = routes::router(registry, cfg);

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutting down");
            shutdown.cancel();
        })
        .await?;

    cancel.cancel();
    if let Err(e) = ingestion.await {
        tracing::error!("Ingestion supervisor ended abnormally: {}", e);
    }

    Ok(())
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `TANKFLOW_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by the `TANKFLOW_LOG_LEVEL` env var
///
/// This should be called once at application startup before any logging
/// or tracing macros are invoked.
fn init_tracing() {
    // ---
    let span_events = match env::var("TANKFLOW_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    // Determine if we should use colors
    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to TANKFLOW_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("TANKFLOW_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},rumqttc=info,hyper=info,reqwest=info"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
