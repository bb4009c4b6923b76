// libs/scheduling-cell/src/router.rs
use std::sync::Arc;

use axum::{middleware, routing::post, Router};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn scheduling_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route(
            "/patients/{patient_id}/proposals",
            post(handlers::generate_proposals),
        )
        .route(
            "/patients/{patient_id}/auto-scheduled/cancel",
            post(handlers::cancel_auto_scheduled),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
