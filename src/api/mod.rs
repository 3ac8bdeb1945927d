//! HTTP surface
//!
//! - `state`: shared application state
//! - `response`: `ApiResponse` envelope and `CoreError` to HTTP mapping
//! - `auth`: bearer-token actor extraction and per-actor rate limiting
//! - `handlers`: one handler per orchestrator operation
//! - `ws`: WebSocket push of domain events

pub mod auth;
pub mod handlers;
pub mod response;
pub mod state;
pub mod ws;

use std::sync::Arc;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use tokio::net::TcpListener;

pub use auth::{Claims, JwtAuth};
pub use response::{ApiResponse, error_codes};
pub use state::AppState;

/// Build the router. Everything except `/health` and the gateway webhook
/// requires a bearer token and passes through the rate limiter.
pub fn router(state: Arc<AppState>) -> Router {
    let authenticated = Router::new()
        .route("/api/v1/cases", post(handlers::create_case))
        .route(
            "/api/v1/cases/{id}",
            get(handlers::get_case).delete(handlers::soft_delete),
        )
        .route("/api/v1/cases/{id}/publish", post(handlers::publish))
        .route("/api/v1/cases/{id}/status", post(handlers::update_status))
        .route("/api/v1/cases/{id}/assign", post(handlers::assign_direct))
        .route("/api/v1/cases/{id}/decline", post(handlers::decline_assignment))
        .route("/api/v1/cases/{id}/solution", post(handlers::record_solution_update))
        .route("/api/v1/cases/{id}/timeline", get(handlers::timeline))
        .route(
            "/api/v1/cases/{id}/offers",
            get(handlers::list_offers).post(handlers::submit_offer),
        )
        .route("/api/v1/offers/{id}/accept", post(handlers::accept_offer))
        .route("/api/v1/offers/{id}/withdraw", post(handlers::withdraw_offer))
        .route("/api/v1/cases/{id}/payment/order", post(handlers::create_order))
        .route("/api/v1/payments/verify", post(handlers::verify_payment))
        .route("/api/v1/admin/sweep", post(handlers::sweep_offers))
        .route("/ws/events", get(ws::ws_handler))
        // Layers run bottom-up: authenticate, then rate limit
        .route_layer(from_fn_with_state(state.clone(), auth::rate_limit_middleware))
        .route_layer(from_fn_with_state(state.clone(), auth::jwt_auth_middleware));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/payments/webhook", post(handlers::payment_webhook))
        .merge(authenticated)
        .with_state(state)
}

/// Bind and serve until the listener fails.
pub async fn run_server(host: &str, port: u16, state: Arc<AppState>) -> std::io::Result<()> {
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "HTTP server listening");
    axum::serve(listener, router(state)).await
}
