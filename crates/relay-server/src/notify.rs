//! Server-originated messages pushed over HTTP.
//!
//! - `POST /ws/broadcast`: deliver to every connected client
//! - `POST /ws/clients/{client_id}/messages`: deliver to one client
//!
//! The body is an envelope. Its `sender` is cleared so recipients can tell
//! server messages from peer messages.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use relay_hub::{DispatchOutcome, Envelope, Undelivered};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::server::AppState;

/// Response body for both notification endpoints.
#[derive(Debug, Serialize)]
pub struct NotifyResponse {
    /// Whether the frame was routed.
    pub delivered: bool,
    /// Mailboxes that accepted it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipients: Option<usize>,
    /// Why it was not routed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

fn server_envelope(body: &[u8]) -> Result<Envelope, ApiError> {
    let mut envelope =
        Envelope::decode_bytes(body).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    envelope.sender.clear();
    Ok(envelope)
}

fn respond(outcome: DispatchOutcome) -> Response {
    match outcome {
        DispatchOutcome::Delivered { recipients, .. } => Json(NotifyResponse {
            delivered: true,
            recipients: Some(recipients),
            reason: None,
        })
        .into_response(),
        DispatchOutcome::NotDelivered(why) => {
            let status = match why {
                Undelivered::TargetNotFound => StatusCode::NOT_FOUND,
                Undelivered::TargetEvicted => StatusCode::SERVICE_UNAVAILABLE,
            };
            let body = NotifyResponse {
                delivered: false,
                recipients: None,
                reason: Some(why.as_str()),
            };
            (status, Json(body)).into_response()
        }
    }
}

/// POST /ws/broadcast
pub async fn broadcast_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let mut envelope = server_envelope(&body)?;
    envelope.target.clear();
    let frame = envelope
        .encode()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let outcome = state.directory.broadcast_to_all(frame).await?;
    info!(
        kind = %envelope.kind,
        recipients = outcome.recipients(),
        "server broadcast"
    );
    Ok(respond(outcome))
}

/// POST /ws/clients/{client_id}/messages
pub async fn unicast_handler(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let envelope = server_envelope(&body)?.with_target(client_id.as_str());
    let frame = envelope
        .encode()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let outcome = state.directory.send_to_client(&client_id, frame).await?;
    debug!(
        kind = %envelope.kind,
        client_id = %client_id,
        delivered = outcome.is_delivered(),
        "server message"
    );
    Ok(respond(outcome))
}
