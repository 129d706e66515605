//! `RelayServer`: Axum HTTP + WebSocket surface over a [`Hub`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use relay_hub::{Hub, MessageHub};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::admission::{self, ConnectionSlots};
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::health::{self, HealthResponse};
use crate::info;
use crate::metrics;
use crate::notify;
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Hub that admitted connections register with.
    pub hub: Hub,
    /// Status and server-push view of the hub.
    pub directory: Arc<dyn MessageHub>,
    /// Shutdown coordinator; agents run under its child tokens.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`, if a recorder was installed.
    pub metrics: Option<PrometheusHandle>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Connection slots bounded by `max_connections`.
    pub slots: ConnectionSlots,
}

/// The relay HTTP + WebSocket server.
pub struct RelayServer {
    config: Arc<ServerConfig>,
    hub: Hub,
    directory: Arc<dyn MessageHub>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
    slots: ConnectionSlots,
}

impl RelayServer {
    /// Create a server in front of `hub`.
    ///
    /// `shutdown` should be the coordinator whose child token the hub
    /// coordinator runs under.
    pub fn new(
        config: ServerConfig,
        hub: Hub,
        shutdown: Arc<ShutdownCoordinator>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            slots: ConnectionSlots::new(config.max_connections),
            config: Arc::new(config),
            directory: Arc::new(hub.clone()),
            hub,
            shutdown,
            metrics,
            start_time: Instant::now(),
        }
    }

    /// Serve status and notification endpoints from `directory` instead of
    /// the hub itself.
    #[must_use]
    pub fn with_directory(mut self, directory: Arc<dyn MessageHub>) -> Self {
        self.directory = directory;
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: self.hub.clone(),
            directory: self.directory.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
            config: self.config.clone(),
            slots: self.slots.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(admission::ws_handler))
            .route("/ws/info", get(info::info_handler))
            .route("/ws/broadcast", post(notify::broadcast_handler))
            .route(
                "/ws/clients/{client_id}/messages",
                post(notify::unicast_handler),
            )
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind and serve in the background until shutdown.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "server stopped with error");
            }
        });

        info!(addr = %local_addr, "relay server listening");
        Ok((local_addr, handle))
    }

    /// The hub this server admits connections into.
    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.directory.client_count(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => metrics::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use relay_hub::agent::ClientSummary;
    use relay_hub::{DispatchOutcome, Envelope, Frame, HubConfig, HubError, Undelivered};
    use serde_json::Value;
    use tower::ServiceExt;

    mockall::mock! {
        pub Directory {}

        #[async_trait]
        impl MessageHub for Directory {
            async fn broadcast_to_all(&self, frame: Frame) -> Result<DispatchOutcome, HubError>;
            async fn send_to_client(
                &self,
                client_id: &str,
                frame: Frame,
            ) -> Result<DispatchOutcome, HubError>;
            fn client_count(&self) -> usize;
            fn client_ids(&self) -> Vec<String>;
            fn clients(&self) -> Vec<ClientSummary>;
        }
    }

    fn make_server(metrics: Option<PrometheusHandle>) -> RelayServer {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let (hub, _coordinator) = Hub::start(&HubConfig::default(), shutdown.child_token());
        RelayServer::new(ServerConfig::default(), hub, shutdown, metrics)
    }

    fn with_mock(directory: MockDirectory) -> Router {
        make_server(None)
            .with_directory(Arc::new(directory))
            .router()
    }

    async fn call(app: Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 100_000)
            .await
            .unwrap();
        let parsed = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, parsed)
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_req(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let (status, body) = call(make_server(None).router(), get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "relay");
        assert_eq!(body["connections"], 0);
        assert!(body["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn cross_origin_requests_allowed() {
        let req = Request::builder()
            .uri("/health")
            .header("origin", "http://example.com")
            .body(Body::empty())
            .unwrap();
        let resp = make_server(None).router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    }

    #[tokio::test]
    async fn health_reports_directory_count() {
        let mut directory = MockDirectory::new();
        let _ = directory.expect_client_count().return_const(7_usize);
        let (_, body) = call(with_mock(directory), get_req("/health")).await;
        assert_eq!(body["connections"], 7);
    }

    #[tokio::test]
    async fn info_lists_clients() {
        let mut directory = MockDirectory::new();
        let _ = directory.expect_client_count().return_const(2_usize);
        let _ = directory
            .expect_client_ids()
            .returning(|| vec!["alice".into(), "bob".into()]);
        let _ = directory.expect_clients().returning(Vec::new);

        let (status, body) = call(with_mock(directory), get_req("/ws/info")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["clients"], 2);
        assert_eq!(body["client_ids"], serde_json::json!(["alice", "bob"]));
        assert_eq!(body["endpoint"], "/ws");
        assert!(body["query_params"].as_str().unwrap().contains("client_id"));
        assert!(body["connections"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn broadcast_clears_sender_and_target() {
        let mut directory = MockDirectory::new();
        let _ = directory
            .expect_broadcast_to_all()
            .withf(|frame: &Frame| {
                let env = Envelope::decode(frame).unwrap();
                env.sender.is_empty() && env.target.is_empty() && env.kind == "notice"
            })
            .times(1)
            .returning(|_| {
                Ok(DispatchOutcome::Delivered {
                    recipients: 3,
                    evicted: 0,
                })
            });

        let (status, body) = call(
            with_mock(directory),
            post_req(
                "/ws/broadcast",
                r#"{"kind":"notice","sender":"mallory","target":"x","payload":1}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["delivered"], true);
        assert_eq!(body["recipients"], 3);
    }

    #[tokio::test]
    async fn unicast_targets_path_client() {
        let mut directory = MockDirectory::new();
        let _ = directory
            .expect_send_to_client()
            .withf(|client_id: &str, _frame: &Frame| client_id == "alice")
            .times(1)
            .returning(|_, frame| {
                let env = Envelope::decode(&frame).unwrap();
                assert_eq!(env.target, "alice");
                Ok(DispatchOutcome::Delivered {
                    recipients: 1,
                    evicted: 0,
                })
            });

        let (status, body) = call(
            with_mock(directory),
            post_req("/ws/clients/alice/messages", r#"{"kind":"dm"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["recipients"], 1);
    }

    #[tokio::test]
    async fn unicast_miss_is_404() {
        let mut directory = MockDirectory::new();
        let _ = directory
            .expect_send_to_client()
            .returning(|_, _| Ok(DispatchOutcome::NotDelivered(Undelivered::TargetNotFound)));

        let (status, body) = call(
            with_mock(directory),
            post_req("/ws/clients/carol/messages", r#"{"kind":"ping"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["delivered"], false);
        assert_eq!(body["reason"], "target_not_found");
    }

    #[tokio::test]
    async fn unicast_eviction_is_503() {
        let mut directory = MockDirectory::new();
        let _ = directory
            .expect_send_to_client()
            .returning(|_, _| Ok(DispatchOutcome::NotDelivered(Undelivered::TargetEvicted)));

        let (status, body) = call(
            with_mock(directory),
            post_req("/ws/clients/slow/messages", r#"{"kind":"ping"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["reason"], "target_evicted");
    }

    #[tokio::test]
    async fn undecodable_body_is_400() {
        let mut directory = MockDirectory::new();
        let _ = directory.expect_broadcast_to_all().never();

        let (status, body) = call(
            with_mock(directory),
            post_req("/ws/broadcast", r#"{"payload":"no kind"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "bad_request");
    }

    #[tokio::test]
    async fn stopped_hub_is_503() {
        let mut directory = MockDirectory::new();
        let _ = directory
            .expect_broadcast_to_all()
            .returning(|_| Err(HubError::Stopped));

        let (status, _) = call(
            with_mock(directory),
            post_req("/ws/broadcast", r#"{"kind":"x"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn broadcast_through_real_hub_with_no_clients() {
        let (status, body) = call(
            make_server(None).router(),
            post_req("/ws/broadcast", r#"{"kind":"x"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["recipients"], 0);
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_404() {
        let resp = make_server(None)
            .router()
            .oneshot(get_req("/metrics"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_with_recorder_renders_text() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let resp = make_server(Some(handle))
            .router()
            .oneshot(get_req("/metrics"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn plain_get_on_ws_is_not_upgraded() {
        let resp = make_server(None)
            .router()
            .oneshot(get_req("/ws"))
            .await
            .unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let resp = make_server(None)
            .router()
            .oneshot(get_req("/nonexistent"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_binds_ephemeral_port_and_stops_on_shutdown() {
        let server = make_server(None);
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);

        server.shutdown().shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn listen_reports_bind_failure() {
        let first = make_server(None);
        let (addr, _handle) = first.listen().await.unwrap();

        let shutdown = Arc::new(ShutdownCoordinator::new());
        let (hub, _coordinator) = Hub::start(&HubConfig::default(), shutdown.child_token());
        let config = ServerConfig {
            port: addr.port(),
            ..ServerConfig::default()
        };
        let second = RelayServer::new(config, hub, shutdown, None);
        assert!(matches!(
            second.listen().await,
            Err(ServerError::Bind { .. })
        ));
    }
}
