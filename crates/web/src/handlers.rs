use autofix_core::AppError;
use autofix_jobs::{Job, JobQueue};
use autofix_sentry::{normalize::normalize, should_process, signature::SentryEvent};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;

use crate::AppState;

pub fn build_router() -> Router<AppState> {
    Router::new().route("/webhook/sentry", post(webhook)).route("/health", get(health))
}

/// Webhook handler: the signature gate and normalizer run in the extractor;
/// this decides whether the event becomes a job and acknowledges immediately
/// either way (Sentry requires a fast response regardless of backlog).
async fn webhook(
    State(queue): State<JobQueue>,
    SentryEvent { envelope }: SentryEvent,
) -> Result<Response, AppError> {
    let issue_id = envelope.data.issue.as_ref().map(|i| i.id.as_str()).unwrap_or("-");
    tracing::info!("Received webhook: action={}, issue_id={}", envelope.action, issue_id);

    if !should_process(&envelope.action) {
        tracing::info!("Ignoring webhook action {}", envelope.action);
        return Ok(accepted("ignored"));
    }
    let Some(error) = normalize(&envelope) else {
        tracing::info!("Webhook has no issue data");
        return Ok(accepted("ignored"));
    };

    let issue_id = error.issue_id.clone();
    let project_slug = error.project_slug.clone();
    if queue.enqueue(Job { envelope, error }) {
        tracing::info!("Queued job for issue {} (project {})", issue_id, project_slug);
    }
    // The drop case was already logged by the queue; the webhook is still
    // acknowledged so Sentry doesn't retry into a full queue.
    Ok(accepted("queued"))
}

fn accepted(status: &str) -> Response {
    (StatusCode::ACCEPTED, Json(json!({ "status": status }))).into_response()
}

async fn health() -> Response { (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response() }
