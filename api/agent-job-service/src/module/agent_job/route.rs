use super::controller;
use crate::app::AppState;
use axum::Router;
use axum::routing::{get, post};

pub fn register_routes(state: AppState) -> Router {
    Router::new()
        .route("/start_job", post(controller::start_job))
        .route("/status", get(controller::get_status))
        .route("/provide_input", post(controller::provide_input))
        .route("/availability", get(controller::availability))
        .route("/input_schema", get(controller::input_schema))
        .route("/payment_evidence", post(controller::payment_evidence))
        .route("/health", get(controller::health))
        .with_state(state)
}
