// libs/availability-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn availability_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route(
            "/practitioners/{practitioner_id}/slots",
            get(handlers::get_practitioner_slots),
        )
        .route(
            "/practitioners/{practitioner_id}/windows",
            get(handlers::list_practitioner_windows),
        )
        .route("/windows", post(handlers::create_window))
        .route("/windows/{window_id}", delete(handlers::deactivate_window))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
