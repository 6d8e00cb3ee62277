use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use metrics_exporter_prometheus::PrometheusHandle;

use terralens_common::api::invoke::{OperationRequest, OperationResponse};

use crate::tools::Dispatcher;

/// Shared application state accessible from axum handlers.
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub metrics_handle: PrometheusHandle,
}

/// POST /invoke — route a tool invocation through the dispatcher.
///
/// The dispatcher never errors at this boundary; failures arrive as
/// structured responses and only the status code is derived here.
pub async fn invoke_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OperationRequest>,
) -> (StatusCode, Json<OperationResponse>) {
    let response = state.dispatcher.dispatch(request).await;
    let status = StatusCode::from_u16(response.http_status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response))
}

/// GET /health.
pub async fn health_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({ "status": "healthy" })),
    )
}

/// GET /metrics — Prometheus render.
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> String {
    state.metrics_handle.render()
}
