use axum::middleware;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{admin, diagnostics, health, webhooks};

pub fn router(state: AppState) -> Router {
    let webhooks = webhooks::router()
        .route_layer(middleware::from_fn_with_state(state.clone(), webhooks::verify_signature));

    Router::new()
        .merge(webhooks)
        .merge(health::router())
        .merge(admin::router(state.clone()))
        .merge(diagnostics::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
