//! HTTP surface: offer endpoint, liveness check and the browser client assets.

use crate::error::SignalError;
use crate::peer::{AnswerEnvelope, Negotiator, OfferEnvelope, SessionRegistry};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub negotiator: Arc<Negotiator>,
    pub asset_dir: Arc<PathBuf>,
}

impl AppState {
    pub fn new(negotiator: Negotiator, asset_dir: PathBuf) -> Self {
        Self {
            negotiator: Arc::new(negotiator),
            asset_dir: Arc::new(asset_dir),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        self.negotiator.registry()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/", get(index))
        .route("/client.js", get(javascript))
        .route("/offer", post(offer))
        .with_state(state)
}

/// Serve until Ctrl+C / SIGTERM, then close every tracked session.
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    let registry = state.registry().clone();
    let addr = listener.local_addr()?;
    info!(%addr, "Signaling server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Signaling server error: {}", e))?;

    registry.close_all().await;
    info!("Signaling server stopped");
    Ok(())
}

async fn ping() -> Json<Value> {
    Json(json!({ "message": "pong" }))
}

async fn index(State(state): State<AppState>) -> Response {
    asset(&state, "index.html", "text/html; charset=utf-8").await
}

async fn javascript(State(state): State<AppState>) -> Response {
    asset(&state, "client.js", "application/javascript; charset=utf-8").await
}

async fn asset(state: &AppState, name: &str, content_type: &'static str) -> Response {
    let path = state.asset_dir.join(name);
    match tokio::fs::read(&path).await {
        Ok(data) => ([(header::CONTENT_TYPE, content_type)], data).into_response(),
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to read asset");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}

async fn offer(
    State(state): State<AppState>,
    payload: Result<Json<OfferEnvelope>, JsonRejection>,
) -> Result<Json<AnswerEnvelope>, SignalError> {
    let Json(offer) = payload.map_err(|e| SignalError::InvalidOffer(e.body_text()))?;
    let answer = state.negotiator.negotiate(offer).await?;
    Ok(Json(answer))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal (Ctrl+C) received");
        },
        _ = terminate => {
            info!("Shutdown signal (SIGTERM) received");
        },
    }
}
