//! HTTP boundary: webhook intake, live event stream, and the process
//! lifecycle that ties them to the scheduler.

mod events;
mod webhook;


use std::any::Any;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{error, info, warn};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;

use crate::config::Config;
use crate::fanout::Broadcaster;
use crate::metrics::Metrics;
use crate::pipeline::{Reconciler, Scheduler};
use crate::store::Store;

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub fanout: Broadcaster,
    /// Shared webhook secret; requests are refused while it is unset
    pub secret: Option<Arc<str>>,
    /// Relay queue size for each event-stream observer
    pub observer_capacity: usize,
    pub keep_alive: Duration,
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(webhook::receive))
        .route("/events", get(events::stream_events))
        .route("/health", get(health))
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!("Request handler panicked: {detail}");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal server error" })),
    )
        .into_response()
}

/// Runs the webhook receiver until Ctrl-C or SIGTERM.
///
/// On shutdown the listener stops accepting connections and in-flight
/// requests get `shutdown-grace-secs` to finish; only then is the scheduler
/// stopped, and it drains every pending event before this returns.
///
/// # Errors
///
/// Returns an error if the database cannot be opened, the listener cannot
/// bind, or the listener stops before shutdown was requested.
pub async fn serve(config: &Config) -> Result<()> {
    let database_path = config.storage.database_path();
    let store = Store::open(&database_path)
        .with_context(|| format!("Failed to open database: {}", database_path.display()))?;

    if config.webhook.secret.is_none() {
        warn!("No webhook secret configured; every delivery will be refused");
    }

    let shutdown = CancellationToken::new();
    // Stopped only after the listener is done, so the final drain sees every
    // delivery accepted during the grace period.
    let scheduler_stop = CancellationToken::new();
    let metrics = Arc::new(Metrics::new());
    let fanout = Broadcaster::new(config.fanout.channel_capacity, shutdown.clone());

    let reconciler = Reconciler::new(
        store.clone(),
        metrics.clone(),
        fanout.clone(),
        config.reconcile.guard(),
    );
    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        reconciler,
        fanout.clone(),
        config.scheduler.settings(),
    ));
    let scheduler_task = tokio::spawn(scheduler.run(scheduler_stop.clone()));

    let state = AppState {
        store,
        fanout,
        secret: config.webhook.secret.as_deref().map(Arc::from),
        observer_capacity: config.fanout.observer_capacity,
        keep_alive: Duration::from_secs(config.fanout.keep_alive_secs),
    };

    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!("Listening for webhooks on {}", config.server.bind);

    let server_shutdown = shutdown.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router(state))
            .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
            .await
    });

    let exited = tokio::select! {
        () = shutdown_signal() => {
            info!("Shutdown requested");
            None
        }
        result = &mut server => {
            error!("Webhook listener exited unexpectedly: {result:?}");
            Some(result)
        }
    };
    shutdown.cancel();

    let grace = Duration::from_secs(config.server.shutdown_grace_secs);
    stop_in_order(
        &mut server,
        exited.is_some(),
        grace,
        &scheduler_stop,
        scheduler_task,
    )
    .await?;

    let snapshot = metrics.snapshot();
    if !snapshot.is_empty() {
        info!("Final metrics: {snapshot:?}");
    }

    listener_outcome(exited)
}

/// Lets the listener finish (aborting it after `grace`), then stops the
/// scheduler and waits for its final drain.
async fn stop_in_order(
    server: &mut JoinHandle<io::Result<()>>,
    server_done: bool,
    grace: Duration,
    scheduler_stop: &CancellationToken,
    scheduler: JoinHandle<()>,
) -> Result<()> {
    if !server_done && tokio::time::timeout(grace, &mut *server).await.is_err() {
        warn!("In-flight requests did not finish within {grace:?}; closing them");
        server.abort();
    }

    scheduler_stop.cancel();
    scheduler
        .await
        .context("Scheduler task failed during shutdown")
}

/// Turns an early listener exit into the process error.
fn listener_outcome(exited: Option<std::result::Result<io::Result<()>, JoinError>>) -> Result<()> {
    match exited {
        None => Ok(()),
        Some(Ok(Ok(()))) => bail!("Webhook listener stopped before shutdown was requested"),
        Some(Ok(Err(e))) => Err(e).context("Webhook listener failed"),
        Some(Err(e)) => Err(e).context("Webhook listener task failed"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {e}");
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
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
