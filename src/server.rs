// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! HTTP endpoint. Every `GET /metrics` runs one full scrape.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;

use crate::exposition::{self, CONTENT_TYPE};
use crate::registry::CollectorRegistry;

const LANDING_PAGE: &str = r#"<html>
<head><title>Slurm Exporter</title></head>
<body>
<h1>Slurm Exporter</h1>
<p><a href="/metrics">Metrics</a></p>
</body>
</html>
"#;

#[derive(Clone)]
struct AppState {
    registry: Arc<CollectorRegistry>,
}

pub fn router(registry: Arc<CollectorRegistry>) -> Router {
    Router::new()
        .route("/", get(landing))
        .route("/metrics", get(metrics))
        .with_state(AppState { registry })
}

async fn landing() -> Html<&'static str> {
    Html(LANDING_PAGE)
}

async fn metrics(State(state): State<AppState>) -> Response {
    let started = Instant::now();
    let set = state.registry.collect().await;

    match exposition::render(state.registry.descriptors(), &set, state.registry.telemetry()) {
        Ok(body) => {
            tracing::debug!(
                series = set.len(),
                bytes = body.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Served metrics"
            );
            ([(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response()
        }
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "Failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e)).into_response()
        }
    }
}

/// Bind `addr`, resolving a host name if it is one.
pub async fn bind(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))
}

/// Bind `addr` and serve until Ctrl-C or SIGTERM.
pub async fn serve(addr: &str, registry: Arc<CollectorRegistry>) -> Result<()> {
    let listener = bind(addr).await?;
    let local = listener.local_addr().context("Listener has no local address")?;
    tracing::info!(address = %addr, local = %local, "Listening");

    axum::serve(listener, router(registry))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
