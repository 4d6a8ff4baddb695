//! HTTP router and protected handlers
//!
//! Every route sits behind the gateway middleware; the handlers here are the
//! downstream chain the gateway either forwards to or cuts off.

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    middleware,
    response::IntoResponse,
    routing::get,
};
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use super::auth::{AuthGateway, gateway_middleware};
use super::session::SecurityContext;

/// Create the router with the gateway middleware installed ahead of every
/// handler.
pub fn create_router(gateway: Arc<AuthGateway>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/session", get(session_handler))
        // Authentication gateway (applied before other layers)
        .layer(middleware::from_fn_with_state(gateway, gateway_middleware))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
}

/// GET /health - liveness probe (authenticated, like everything else)
async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// GET /api/session - echo the security context the gateway installed
async fn session_handler(Extension(context): Extension<SecurityContext>) -> impl IntoResponse {
    Json(json!({
        "principal": context.principal,
        "roles": context.roles,
        "sessionId": context.session_id,
        "remoteAddr": context.remote_addr.map(|a| a.to_string()),
    }))
}
