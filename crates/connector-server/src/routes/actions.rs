use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use tokio::time::Instant;
use tracing::info;

use connector_core::{ActionBody, ActionRequest};

use crate::error::AppError;
use crate::state::AppState;

/// POST /: receive a Port action invocation and run it to completion.
///
/// The response is sent only after the run's status has been reported back
/// to Port (or the action was rejected as malformed).
pub async fn handle_action(
    State(app): State<AppState>,
    body: Result<Json<ActionBody>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Json(body) = body.map_err(|e| AppError::bad_request(e.body_text()))?;

    let mut request = ActionRequest::from_body(&body);
    if let Some(timeout) = app.action_timeout {
        request = request.with_deadline(Instant::now() + timeout);
    }
    info!(
        run_id = %request.run_id,
        action = %request.action_identifier,
        trigger = %request.trigger,
        blueprint = %request.blueprint,
        "action received"
    );

    // Detached so that a dropped connection cannot cancel a running stack
    // operation.
    let dispatcher = app.dispatcher.clone();
    let outcome = tokio::spawn(async move { dispatcher.dispatch(&request).await })
        .await
        .map_err(|e| AppError(anyhow::anyhow!("action task failed: {e}")))??;

    info!(run_id = %outcome.run_id, status = %outcome.status, "action completed");
    Ok(Json(serde_json::json!({ "message": "ok" })))
}
