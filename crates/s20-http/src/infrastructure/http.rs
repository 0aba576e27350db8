//! Axum router and handlers.
//!
//! | Route                   | Action                     |
//! |-------------------------|----------------------------|
//! | `GET /STATUS/{address}` | query the relay            |
//! | `GET /ON/{address}`     | switch on                  |
//! | `GET /OFF/{address}`    | switch off                 |
//! | `GET /devices`          | list known plugs           |
//! | `GET /health`           | liveness, always `OK`      |

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use s20_client::{ControlError, Transport};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::application::{PlugService, PlugServiceError};
use crate::domain::{DeviceEntry, ErrorResponse, PlugStateResponse};

/// Builds the router over a shared [`PlugService`].
pub fn router<T: Transport + 'static>(service: Arc<PlugService<T>>) -> Router {
    Router::new()
        .route("/STATUS/:address", get(handle_status::<T>))
        .route("/ON/:address", get(handle_on::<T>))
        .route("/OFF/:address", get(handle_off::<T>))
        .route("/devices", get(handle_devices::<T>))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Binds `addr` and serves `router` until `shutdown` resolves.
///
/// # Errors
///
/// Returns the I/O error if the listener cannot be bound or the server fails.
pub async fn serve(
    addr: SocketAddr,
    router: Router,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

// ── Handlers ──────────────────────────────────────────────────────────────────

async fn handle_status<T: Transport + 'static>(
    State(service): State<Arc<PlugService<T>>>,
    Path(address): Path<String>,
) -> Result<Json<PlugStateResponse>, ApiError> {
    Ok(Json(service.status(&address).await?))
}

async fn handle_on<T: Transport + 'static>(
    State(service): State<Arc<PlugService<T>>>,
    Path(address): Path<String>,
) -> Result<Json<PlugStateResponse>, ApiError> {
    Ok(Json(service.switch(&address, true).await?))
}

async fn handle_off<T: Transport + 'static>(
    State(service): State<Arc<PlugService<T>>>,
    Path(address): Path<String>,
) -> Result<Json<PlugStateResponse>, ApiError> {
    Ok(Json(service.switch(&address, false).await?))
}

async fn handle_devices<T: Transport + 'static>(
    State(service): State<Arc<PlugService<T>>>,
) -> Json<Vec<DeviceEntry>> {
    Json(service.devices().await)
}

async fn handle_health() -> &'static str {
    "OK"
}

// ── Error mapping ─────────────────────────────────────────────────────────────

/// A [`PlugServiceError`] rendered as a status code and JSON body.
#[derive(Debug)]
pub struct ApiError(PlugServiceError);

impl From<PlugServiceError> for ApiError {
    fn from(err: PlugServiceError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            PlugServiceError::InvalidAddress(_) => StatusCode::BAD_REQUEST,
            PlugServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            PlugServiceError::Control(ControlError::DeviceUnreachable { .. }) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            PlugServiceError::Control(ControlError::SubscriptionFailed { .. }) => {
                StatusCode::BAD_GATEWAY
            }
            PlugServiceError::Control(_) | PlugServiceError::Discovery(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("request failed: {}", self.0);
        }
        let body = ErrorResponse {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
