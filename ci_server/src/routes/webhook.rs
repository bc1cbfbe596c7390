//! GitHub webhook handler — accepts push events and starts a build for each.

use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use serde_json::json;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::models::PushEvent;
use crate::services::pipeline::Pipeline;

/// Handle an incoming GitHub webhook payload.
///
/// A push starts a build on a task tracked by `builds` and answers
/// `202 Accepted` right away; every other event is acknowledged and ignored.
pub fn handle_webhook(
    pipeline: &Arc<Pipeline>,
    builds: &TaskTracker,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), StatusCode> {
    let payload: serde_json::Value = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!("Malformed webhook JSON: {e}");
        StatusCode::BAD_REQUEST
    })?;

    let event_type = event_type(headers, &payload);
    crate::metrics::webhook_received(metric_label(event_type));

    match event_type {
        "push" => handle_push(pipeline, builds, &payload),
        "ping" => {
            tracing::info!("Received GitHub ping webhook");
            Ok(ignored("ping"))
        }
        other => {
            tracing::debug!("Ignoring webhook event: {}", other);
            Ok(ignored(other))
        }
    }
}

/// Event type from `X-GitHub-Event`; without the header, a payload that
/// looks like a push is treated as one.
fn event_type<'a>(headers: &'a HeaderMap, payload: &serde_json::Value) -> &'a str {
    match headers.get("x-github-event").and_then(|v| v.to_str().ok()) {
        Some(event) => event,
        None if payload.get("ref").is_some() && payload.get("repository").is_some() => "push",
        None => "unknown",
    }
}

/// Bounded label set for the webhook counter; the header is sender-controlled.
fn metric_label(event_type: &str) -> &'static str {
    match event_type {
        "push" => "push",
        "ping" => "ping",
        "pull_request" => "pull_request",
        "unknown" => "unknown",
        _ => "other",
    }
}

fn handle_push(
    pipeline: &Arc<Pipeline>,
    builds: &TaskTracker,
    payload: &serde_json::Value,
) -> Result<(StatusCode, Json<serde_json::Value>), StatusCode> {
    let event = match PushEvent::from_payload(payload) {
        Ok(Some(event)) => event,
        Ok(None) => {
            tracing::debug!("Push does not target a branch head, ignoring");
            return Ok(ignored("push"));
        }
        Err(e) => {
            tracing::warn!("Invalid push payload: {e}");
            return Err(StatusCode::BAD_REQUEST);
        }
    };

    tracing::info!(
        repo = %event.repository_url,
        branch = %event.branch,
        commit_sha = %event.commit_sha,
        "Build triggered from push webhook"
    );

    let run_id = Uuid::new_v4();
    let commit_sha = event.commit_sha.clone();
    let pipeline = Arc::clone(pipeline);
    builds.spawn(async move {
        pipeline.run_as(run_id, event).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "accepted",
            "run_id": run_id,
            "commit_sha": commit_sha,
        })),
    ))
}

fn ignored(event: &str) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({ "status": "ignored", "event": event })),
    )
}
