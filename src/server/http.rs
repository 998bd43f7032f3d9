//! HTTP boundary for the `/push` routes.
//!
//! Thin axum handlers over a shared [`DispatchCoordinator`]. Bodies are
//! validated by the `Json` extractor, so malformed requests are rejected with
//! a 4xx before the coordinator is touched.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

use super::dispatch::{DispatchCoordinator, DispatchReport};
use crate::constants::ALERT_TEST_PAYLOAD;
use crate::types::{EndpointRequest, InvalidEndpoint, MessageResponse, SubscriptionDescriptor};

/// Body of `GET /push/alert`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertResponse {
    /// Always `RECEIVED`.
    pub message: String,
    /// Per-recipient outcome of the dispatch.
    pub report: DispatchReport,
}

/// Unsubscribe accepts either the full descriptor or just its endpoint URI.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EndpointRef {
    Descriptor(SubscriptionDescriptor),
    Uri(String),
}

impl EndpointRef {
    fn endpoint(&self) -> &str {
        match self {
            Self::Descriptor(descriptor) => &descriptor.endpoint,
            Self::Uri(uri) => uri,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UnsubscribeRequest {
    endpoint: EndpointRef,
}

struct ApiError(InvalidEndpoint);

impl From<InvalidEndpoint> for ApiError {
    fn from(err: InvalidEndpoint) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        log::warn!("[Http] {}", self.0);
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(MessageResponse::new("INVALID_ENDPOINT")),
        )
            .into_response()
    }
}

/// Build the router serving the `/push` routes.
pub fn router(coordinator: Arc<DispatchCoordinator>) -> Router {
    Router::new()
        .route("/push", get(health))
        .route("/push/", get(health))
        .route("/push/subscribe", post(subscribe))
        .route("/push/unsubscribe", post(unsubscribe))
        .route("/push/alert", get(alert))
        .with_state(coordinator)
}

/// Serve the `/push` routes on `listener` until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    coordinator: Arc<DispatchCoordinator>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        log::info!("[Http] Listening on http://{addr}/push");
    }
    axum::serve(listener, router(coordinator))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health() -> Json<MessageResponse> {
    Json(MessageResponse::new("RECEIVED"))
}

async fn subscribe(
    State(coordinator): State<Arc<DispatchCoordinator>>,
    Json(request): Json<EndpointRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    coordinator.register(request.endpoint)?;
    Ok(Json(MessageResponse::new("SUBSCRIBED")))
}

async fn unsubscribe(
    State(coordinator): State<Arc<DispatchCoordinator>>,
    Json(request): Json<UnsubscribeRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    coordinator.unregister(request.endpoint.endpoint())?;
    Ok(Json(MessageResponse::new("UNSUBSCRIBED")))
}

async fn alert(State(coordinator): State<Arc<DispatchCoordinator>>) -> Json<AlertResponse> {
    let report = coordinator
        .dispatch_to_all(ALERT_TEST_PAYLOAD.as_bytes())
        .await;
    Json(AlertResponse {
        message: "RECEIVED".to_string(),
        report,
    })
}
