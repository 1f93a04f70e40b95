use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crm_service::CrmApi;
use shared_lib::config::CrmConfig;

pub mod route_handlers;

pub struct AppState {
    pub config: CrmConfig,
    pub crm: Arc<dyn CrmApi>,
}

pub type SharedAppState = Arc<AppState>;

impl AppState {
    pub fn new(config: CrmConfig, crm: Arc<dyn CrmApi>) -> SharedAppState {
        Arc::new(Self { config, crm })
    }
}

/**
 * main router for the app, the lead webhook lives under /api and /wh
 **/
pub fn get_main_router(state: SharedAppState) -> Router {
    tracing::debug!("initializing router(s) ...");

    Router::new()
        .route("/healthcheck", get(|| async { "Ok" }))
        .route("/wh/lead", post(route_handlers::lead_webhook::handler))
        .nest("/api", get_api_router())
        .with_state(state)
}

fn get_api_router() -> Router<SharedAppState> {
    Router::new().route(
        "/elevenlabs-webhook",
        post(route_handlers::lead_webhook::handler),
    )
}
