mod admin;
mod bootstrap;
mod diagnostics;
mod error;
mod export;
mod health;
mod logs;
mod notify;
mod routes;
mod state;
mod sweeper;
mod webhooks;

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use hostline_core::config::{AppConfig, LoadOptions, LogFormat};
use hostline_core::domain::call::CallStatus;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::logs::LogBuffer;
use crate::state::{AppState, ShutdownReason};

fn init_logging(config: &AppConfig) -> LogBuffer {
    let buffer = LogBuffer::new(config.logging.buffer_capacity);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = match config.logging.format {
        LogFormat::Compact => tracing_subscriber::fmt::layer().with_target(false).compact().boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().with_target(false).pretty().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer().with_target(false).json().boxed(),
    };

    tracing_subscriber::registry().with(filter).with(fmt_layer).with(buffer.clone()).init();
    buffer
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::FAILURE;
        }
    };
    let logs = init_logging(&config);

    match run(config, logs).await {
        Ok(reason) => ExitCode::from(reason.exit_code()),
        Err(err) => {
            error!(
                event_name = "system.server.failed",
                correlation_id = "bootstrap",
                error = %format!("{err:#}"),
                "hostline server failed"
            );
            ExitCode::FAILURE
        }
    }
}

async fn run(config: AppConfig, logs: LogBuffer) -> Result<ShutdownReason> {
    let state = bootstrap::bootstrap_with_config(config, logs).await?;
    let sweeper = sweeper::spawn(state.clone());

    let address = format!("{}:{}", state.config.server.bind_address, state.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "hostline server listening"
    );

    let shutdown = state.shutdown.clone();
    let app = routes::router(state.clone());
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.triggered().await;
            })
            .await
    });

    let reason = tokio::select! {
        () = shutdown_signal() => {
            state.shutdown.trigger(ShutdownReason::Signal);
            state.shutdown.triggered().await
        }
        reason = state.shutdown.triggered() => reason,
    };
    info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        reason = ?reason,
        "hostline server stopping"
    );

    drain(&state, server).await;
    let _ = sweeper.await;

    let closed = state.exporter.finish_all(state.conversations.drain().await, CallStatus::Failed).await;
    info!(
        event_name = "system.server.stopped",
        correlation_id = "shutdown",
        sessions_closed = closed,
        exit_code = reason.exit_code(),
        "hostline server stopped"
    );
    state.db_pool.close().await;

    Ok(reason)
}

/// Waits for in-flight requests, giving up after `server.graceful_shutdown_secs`.
async fn drain(state: &AppState, server: tokio::task::JoinHandle<std::io::Result<()>>) {
    let limit = Duration::from_secs(state.config.server.graceful_shutdown_secs);
    match tokio::time::timeout(limit, server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(err))) => error!(
            event_name = "system.server.error",
            correlation_id = "shutdown",
            error = %err,
            "http server terminated with an error"
        ),
        Ok(Err(err)) => error!(
            event_name = "system.server.error",
            correlation_id = "shutdown",
            error = %err,
            "http server task panicked"
        ),
        Err(_) => error!(
            event_name = "system.server.drain_timeout",
            correlation_id = "shutdown",
            limit_secs = limit.as_secs(),
            "in-flight requests did not finish before the shutdown deadline"
        ),
    }
}

/// Resolves on ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(
                event_name = "system.server.signal_error",
                correlation_id = "shutdown",
                error = %err,
                "ctrl-c handler unavailable"
            );
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!(event_name = "system.server.signal", correlation_id = "shutdown", signal = "ctrl_c", "received ctrl-c"),
        () = terminate => info!(event_name = "system.server.signal", correlation_id = "shutdown", signal = "sigterm", "received SIGTERM"),
    }
}
