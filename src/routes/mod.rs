pub mod auth;
pub mod inventory;
pub mod payments;
pub mod stripe;

use axum::{
    response::IntoResponse,
    routing::{get, post},
    Router,
};

use crate::responses::JsonResponse;
use crate::state::AppState;

async fn health() -> impl IntoResponse {
    JsonResponse::success("ok")
}

/// Every API route, with state applied. Transport layers (CORS, tracing,
/// rate limiting) are added by the binary.
pub fn router(state: AppState) -> Router {
    let payment_routes = Router::new()
        .route("/checkout", post(payments::checkout))
        .route("/status", get(payments::status))
        .route("/verify-session", post(payments::verify_session))
        .route("/complete-upgrade", post(payments::complete_upgrade))
        .route("/complete-membership", post(payments::complete_membership));

    Router::new()
        .route("/api/health", get(health))
        .route("/api/auth/me", get(auth::handle_me))
        .route("/api/stripe/webhook", post(stripe::webhook))
        .route("/api/inventory/search", get(inventory::search))
        .nest("/api/payments", payment_routes)
        .with_state(state)
}
