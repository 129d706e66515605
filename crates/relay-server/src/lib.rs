//! # relay-server
//!
//! Axum HTTP + `WebSocket` surface for the relay hub.
//!
//! - `GET /ws`: admission; each upgraded socket becomes a connection agent
//! - `GET /ws/info`, `GET /health`, `GET /metrics`: status
//! - `POST /ws/broadcast`, `POST /ws/clients/{client_id}/messages`: server push
//! - Graceful shutdown via a shared `CancellationToken`

#![deny(unsafe_code)]

pub mod admission;
pub mod config;
pub mod error;
pub mod health;
pub mod info;
pub mod logging;
pub mod metrics;
pub mod notify;
pub mod server;
pub mod shutdown;
pub mod transport;

pub use config::ServerConfig;
pub use error::{ApiError, ServerError};
pub use server::{AppState, RelayServer};
pub use shutdown::ShutdownCoordinator;
