//! Authenticated admin API over the engine's lifecycle and log calls.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::engine::ConfigurationEngine;

#[derive(Clone)]
pub struct AdminState {
    pub engine: ConfigurationEngine,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(engine: ConfigurationEngine, api_key: impl Into<Arc<str>>) -> Self {
        Self {
            engine,
            api_key: api_key.into(),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/configurations", get(get_configurations))
        .route("/admin/configurations/{name}", get(get_configuration))
        .route("/admin/configurations/{name}/load", post(load_configuration))
        .route("/admin/configurations/{name}/unload", post(unload_configuration))
        .route("/admin/configurations/{name}/reload", post(reload_configuration))
        .route("/admin/logs/{name}", get(get_log))
        .route("/admin/full-reload", post(full_reload))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
