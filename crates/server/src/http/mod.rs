use axum::{Router, middleware::from_fn_with_state, routing::get};
use tower_http::trace::TraceLayer;

use crate::{AppState, routes};

pub mod auth;

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .merge(routes::config::router())
        .merge(routes::orders::router(&state))
        .merge(routes::comments::router())
        .merge(routes::tags::router())
        .merge(routes::items::router())
        .layer(from_fn_with_state(state.clone(), auth::require_caller));

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
