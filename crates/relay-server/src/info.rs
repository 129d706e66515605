//! `GET /ws/info`: connection status for operators.

use axum::Json;
use axum::extract::State;
use relay_hub::agent::ClientSummary;
use serde::Serialize;

use crate::server::AppState;

/// Response body of `/ws/info`.
#[derive(Debug, Serialize)]
pub struct WsInfo {
    /// Always `"ok"`.
    pub status: &'static str,
    /// Connected client count.
    pub clients: usize,
    /// Sorted non-empty client ids.
    pub client_ids: Vec<String>,
    /// Upgrade endpoint path.
    pub endpoint: &'static str,
    /// Human-readable description.
    pub description: &'static str,
    /// Accepted query parameters.
    pub query_params: &'static str,
    /// Per-connection detail.
    pub connections: Vec<ClientSummary>,
}

/// GET /ws/info
pub async fn info_handler(State(state): State<AppState>) -> Json<WsInfo> {
    Json(WsInfo {
        status: "ok",
        clients: state.directory.client_count(),
        client_ids: state.directory.client_ids(),
        endpoint: "/ws",
        description: "WebSocket endpoint for real-time messaging",
        query_params: "client_id (optional): identifier other clients use to address this one; \
                       falls back to the X-Client-ID header",
        connections: state.directory.clients(),
    })
}
