// Copyright (c) 2026 the lanpeerdiscoveryd authors
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! `GET /peers` and `GET /metrics` (§6, §4.8). Both issue a request across
//! the bus (or read the metrics registry directly) and never touch the peer
//! map directly; the Table remains the sole owner (I1).

use crate::core::bus::BusSender;
use crate::monitoring::metrics::Metrics;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The listen socket could not be bound.
    #[error("bind http socket")]
    Bind,
    /// The server loop returned an I/O error.
    #[error("http server")]
    Serve,
}

#[derive(Clone)]
struct AppState {
    bus: BusSender,
    metrics: Arc<Metrics>,
}

async fn peers_handler(State(state): State<AppState>) -> Response {
    match state.bus.list_peers().await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    state.metrics.encode().into_response()
}

fn router(bus: BusSender, metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route("/peers", get(peers_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(AppState { bus, metrics })
}

/// Serve the HTTP shim on `0.0.0.0:port` until `cancel` fires.
pub async fn run(
    port: u16,
    bus: BusSender,
    metrics: Arc<Metrics>,
    cancel: CancellationToken,
) -> Result<(), HttpError> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|_| HttpError::Bind)?;
    info!(%addr, "http shim listening");

    axum::serve(listener, router(bus, metrics))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|err| {
            error!(%err, "http server error");
            HttpError::Serve
        })
}
