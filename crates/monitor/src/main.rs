//! `laundry-monitor` -- washer / dryer cycle finish notifier.
//!
//! Samples the power draw of Tapo P110 smart plugs, detects when each
//! appliance's cycle completes, and sends a Pushover notification. See
//! [`laundry_monitor::config`] for the environment variables.

use std::sync::Arc;
use std::time::Duration;

use laundry_monitor::config::MonitorConfig;
use laundry_monitor::notify::{self, Notifier, PushoverSink, MONITOR_LABEL};
use laundry_monitor::sampler::TapoConnector;
use laundry_monitor::supervisor;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long to wait for queued notifications to go out before exiting.
const NOTIFICATION_DRAIN_TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "laundry_monitor=info,laundry_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = MonitorConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    let sink = PushoverSink::new(config.pushover.clone()).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to build notification client");
        std::process::exit(1);
    });

    tracing::info!(
        devices = config.devices.len(),
        max_consecutive_read_failures = ?config.max_consecutive_read_failures,
        "Starting laundry-monitor",
    );

    let (notifier, dispatcher) = Notifier::spawn(Arc::new(sink));
    let connector = TapoConnector::new(&config.tapo);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    let outcome = supervisor::start(&config, &connector, notifier.clone(), cancel).await;

    let exit_code = match outcome {
        Ok(report) if report.crashed.is_empty() => 0,
        Ok(report) => {
            tracing::error!(crashed = ?report.crashed, "Monitoring ended after device crashes");
            1
        }
        Err(_) => 1,
    };

    notifier.notify(notify::STOPPED_MESSAGE, MONITOR_LABEL);
    drop(notifier);

    if tokio::time::timeout(NOTIFICATION_DRAIN_TIMEOUT, dispatcher)
        .await
        .is_err()
    {
        tracing::warn!("Timed out delivering pending notifications");
    }

    tracing::info!("laundry-monitor stopped");
    std::process::exit(exit_code);
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
