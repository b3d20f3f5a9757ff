use std::sync::Arc;

use axum::{Router, extract::State, http::StatusCode, routing::get};
use chrono::Utc;
use tracing::{error, info};

use binlevel_core::{SamplingService, Trigger};

pub(crate) const TRIGGER_OK: &str = "Trash levels posted successfully!";
pub(crate) const TRIGGER_FAILED: &str = "Error posting trash levels.";
pub(crate) const HEALTH: &str = "Backend is working!";

pub(crate) fn make_app(service: Arc<SamplingService>) -> Router {
    Router::new()
        .route("/trigger", get(trigger))
        .route("/test", get(health))
        .with_state(service)
}

pub(crate) async fn trigger(
    State(service): State<Arc<SamplingService>>,
) -> (StatusCode, &'static str) {
    info!(started_at = %Utc::now(), "Manual trigger started");
    match service.run_pass(Trigger::Manual).await {
        Ok(_report) => (StatusCode::OK, TRIGGER_OK),
        Err(err) => {
            error!(error = %err, "Error in manual trigger");
            (StatusCode::INTERNAL_SERVER_ERROR, TRIGGER_FAILED)
        }
    }
}

pub(crate) async fn health() -> &'static str {
    HEALTH
}
