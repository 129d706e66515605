//! `GET /ws`: admit a connection and hand it to a connection agent.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::http::header::USER_AGENT;
use axum::response::Response;
use relay_hub::{Admission, run_agent};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::server::AppState;
use crate::transport::WsTransport;

/// Header consulted when the query string carries no client id.
pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// Connection slots shared by every upgrade.
///
/// A slot is taken before the upgrade is accepted and released when the
/// agent finishes (or the upgrade is abandoned), so concurrent upgrades
/// cannot overshoot the limit.
#[derive(Clone, Debug)]
pub struct ConnectionSlots {
    in_use: Arc<AtomicUsize>,
    limit: usize,
}

impl ConnectionSlots {
    /// Slots for at most `limit` concurrent connections.
    pub fn new(limit: usize) -> Self {
        Self {
            in_use: Arc::new(AtomicUsize::new(0)),
            limit,
        }
    }

    /// Take a slot, or `None` when all are in use.
    pub fn try_acquire(&self) -> Option<SlotGuard> {
        self.in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.limit).then_some(n + 1)
            })
            .ok()
            .map(|_| SlotGuard {
                in_use: self.in_use.clone(),
            })
    }

    /// Slots currently held.
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    /// Configured limit.
    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// A held connection slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct SlotGuard {
    in_use: Arc<AtomicUsize>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let _ = self.in_use.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Query parameters accepted on `/ws`.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// Client identifier chosen by the peer.
    pub client_id: Option<String>,
}

/// Pick the client id: query parameter first, then `X-Client-ID`, else
/// anonymous (empty).
pub fn resolve_client_id(query: Option<&str>, headers: &HeaderMap) -> String {
    let from_query = query.map(str::trim).filter(|id| !id.is_empty());
    let from_header = || {
        headers
            .get(CLIENT_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
    };
    from_query.or_else(from_header).unwrap_or_default().to_owned()
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let Some(slot) = state.slots.try_acquire() else {
        warn!(
            connected = state.slots.in_use(),
            limit = state.slots.limit(),
            "connection limit reached, refusing upgrade"
        );
        return Err(ApiError::Unavailable("connection limit reached".into()));
    };

    let client_id = resolve_client_id(params.client_id.as_deref(), &headers);
    let mut admission = Admission::new(client_id);
    if let Some(agent) = headers.get(USER_AGENT).and_then(|v| v.to_str().ok()) {
        admission = admission.with_metadata("user_agent", Value::String(agent.to_owned()));
    }
    debug!(client_id = %admission.client_id, "upgrading connection");

    let hub = state.hub.clone();
    let config = state.config.agent.clone();
    let shutdown = state.shutdown.child_token();
    let max_frame = config.max_frame_size;

    Ok(ws
        .max_message_size(max_frame)
        .max_frame_size(max_frame)
        .on_upgrade(move |socket| async move {
            let _ = run_agent(hub, WsTransport::new(socket), admission, config, shutdown).await;
            drop(slot);
        }))
}
