//! HTTP surface of the exporter
//!
//! `/probe` runs one audit per request; every other path is a 404. All
//! requests, 404s included, pass through the probe gate first, so at most one
//! request is being handled at any moment.

use crate::{AuditSession, Config, Gate, Metrics, ProbeRequest};
use anyhow::Context;
use axum::extract::{RawQuery, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Clone)]
pub struct AppState {
    pub gate: Gate,
    pub session: AuditSession,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(session: AuditSession, metrics: Arc<Metrics>) -> Self {
        Self {
            gate: Gate::new(),
            session,
            metrics,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/probe", any(probe))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), serialize_requests))
        .with_state(state)
}

/// Hold the gate for the whole lifetime of a request.
///
/// The request runs in its own task. A scraper that disconnects mid-audit
/// cancels only the wait on that task, so the audit runs to completion, the
/// browser is closed and the gate stays held until then.
async fn serialize_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();

    let task = tokio::spawn(async move {
        state.metrics.set_gate_waiting(state.gate.waiting() + 1);
        let _guard = state.gate.acquire().await;
        state.metrics.set_gate_waiting(state.gate.waiting());

        debug!(path = %request.uri().path(), "Gate acquired");
        next.run(request).await
    });

    match task.await {
        Ok(response) => response,
        Err(e) => {
            error!(path = %path, error = %e, "Request task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn probe(State(state): State<AppState>, RawQuery(query): RawQuery) -> impl IntoResponse {
    let request = ProbeRequest::from_query(query.as_deref());

    let started = Instant::now();
    let outcome = state.session.run(&request).await;
    state.metrics.record_probe(&outcome, started.elapsed());

    (
        [(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)],
        outcome.render(&request),
    )
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Bind the configured address and serve until `shutdown_rx` fires.
pub async fn run(
    config: &Config,
    state: AppState,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let addr = config.listen_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    serve(listener, state, async move {
        let _ = shutdown_rx.recv().await;
    })
    .await
}

/// Serve on an already bound listener until `shutdown` completes.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(address = %addr, "Probe endpoint listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("probe server failed")?;

    info!("Probe endpoint stopped");
    Ok(())
}
