//! HTTP surface: `POST /api/messages` runs one message through the pipeline
//! and returns every reply it produced.

use crate::error::AppError;
use crate::pipeline::{CollectingSink, InboundMessage, Outcome, RequestHandler};
use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub handler: Arc<RequestHandler>,
}

pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/api/messages", post(handle_message))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub replies: Vec<String>,
    pub outcome: &'static str,
}

fn outcome_label(outcome: &Outcome) -> &'static str {
    match outcome {
        Outcome::Welcomed => "welcomed",
        Outcome::Helped => "helped",
        Outcome::NoContext => "no_context",
        Outcome::Answered(_) => "answered",
    }
}

#[instrument(skip_all)]
async fn handle_message(
    State(state): State<SharedState>,
    payload: Result<Json<InboundMessage>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let Json(request) = payload?;
    info!(user_id = request.user_id, "Message received over HTTP");

    let sink = CollectingSink::new();
    let outcome = state.handler.handle(&request, &sink).await;

    Ok(Json(MessageResponse {
        replies: sink.into_replies(),
        outcome: outcome_label(&outcome),
    }))
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
