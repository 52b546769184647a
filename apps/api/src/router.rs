use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use availability_cell::router::availability_routes;
use booking_cell::router::booking_routes;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "NutriCoach API is running!" }))
        .nest("/availability", availability_routes(state.clone()))
        .nest("/appointments", booking_routes(state.clone()))
}
