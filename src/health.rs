use axum::http::StatusCode;
use serde_json::json;
use std::sync::Arc;

use crate::context::RequestContext;
use crate::response::Response;

/// Health check endpoint - returns OK if server is running
pub async fn health_check(_ctx: Arc<RequestContext>) -> Response {
    Response::json(json!({"status": "ok"})).with_status(StatusCode::OK)
}

/// Readiness check endpoint. The router holds no connections, so it is
/// ready as soon as it serves.
pub async fn readiness_check(_ctx: Arc<RequestContext>) -> Response {
    Response::json(json!({"status": "ready"})).with_status(StatusCode::OK)
}
