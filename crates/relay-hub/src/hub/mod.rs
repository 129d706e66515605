//! The hub: single authority over who is connected and who gets a frame.
//!
//! [`Hub`] is a cheap, cloneable handle. Every mutation and routing decision
//! is a [`Command`] processed one at a time by the [`HubCoordinator`] task.
//! Read-only status queries (`client_count`, `client_ids`, `clients`) go
//! straight to a registry snapshot behind a `parking_lot::RwLock` that only
//! the coordinator writes and that is never held across an `.await`.

mod capability;
mod coordinator;
mod registry;

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use capability::MessageHub;
pub use coordinator::HubCoordinator;

use crate::agent::{AgentHandle, ClientSummary, ConnectionId};
use crate::envelope::Frame;
use crate::errors::HubError;
use registry::Registry;

/// Default depth of the coordinator's command queue.
pub const DEFAULT_COMMAND_CAPACITY: usize = 256;

/// Hub tuning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HubConfig {
    /// Commands buffered before callers start waiting on the coordinator.
    pub command_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            command_capacity: DEFAULT_COMMAND_CAPACITY,
        }
    }
}

/// How a dispatch picks its recipients. Always chosen by the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    /// The one agent registered under this client id.
    Unicast(String),
    /// Every registered agent except the given connection.
    AllExcept(ConnectionId),
    /// Every registered agent.
    All,
}

impl Route {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unicast(_) => "unicast",
            Self::AllExcept(_) => "broadcast_except",
            Self::All => "broadcast_all",
        }
    }
}

/// Why a unicast dispatch reached nobody.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Undelivered {
    /// No agent is registered under the target client id.
    TargetNotFound,
    /// The target's mailbox was full; the target has been evicted.
    TargetEvicted,
}

impl Undelivered {
    /// Stable label for logs and API responses.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TargetNotFound => "target_not_found",
            Self::TargetEvicted => "target_evicted",
        }
    }
}

/// Result of a dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The frame was queued for `recipients` agents; `evicted` slow agents
    /// were disconnected instead.
    Delivered {
        /// Mailboxes that accepted the frame.
        recipients: usize,
        /// Agents torn down because their mailbox was full.
        evicted: usize,
    },
    /// A unicast dispatch reached nobody.
    NotDelivered(Undelivered),
}

impl DispatchOutcome {
    /// Whether the dispatch was routed (possibly to zero broadcast recipients).
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// Number of mailboxes that accepted the frame.
    pub fn recipients(&self) -> usize {
        match self {
            Self::Delivered { recipients, .. } => *recipients,
            Self::NotDelivered(_) => 0,
        }
    }
}

/// Requests processed by the coordinator.
pub(crate) enum Command {
    Register {
        agent: Arc<AgentHandle>,
        done: oneshot::Sender<()>,
    },
    Unregister {
        id: ConnectionId,
        done: oneshot::Sender<()>,
    },
    Dispatch {
        frame: Frame,
        route: Route,
        reply: oneshot::Sender<DispatchOutcome>,
    },
}

/// Handle to the hub coordinator.
#[derive(Clone)]
pub struct Hub {
    commands: mpsc::Sender<Command>,
    registry: Arc<RwLock<Registry>>,
}

impl Hub {
    /// Create a hub handle and the coordinator that must be run for it to
    /// make progress.
    pub fn new(config: &HubConfig) -> (Self, HubCoordinator) {
        let (tx, rx) = mpsc::channel(config.command_capacity.max(1));
        let registry = Arc::new(RwLock::new(Registry::default()));
        let hub = Self {
            commands: tx,
            registry: registry.clone(),
        };
        (hub, HubCoordinator::new(rx, registry))
    }

    /// Create a hub and spawn its coordinator on the current runtime.
    pub fn start(config: &HubConfig, cancel: CancellationToken) -> (Self, JoinHandle<()>) {
        let (hub, coordinator) = Self::new(config);
        let handle = tokio::spawn(coordinator.run(cancel));
        (hub, handle)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, HubError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| HubError::Stopped)?;
        rx.await.map_err(|_| HubError::Stopped)
    }

    /// Add an agent to the registry.
    ///
    /// An agent already registered under the same non-empty client id is
    /// told it was replaced and closed. Completes once the registry reflects
    /// the new agent.
    pub async fn register(&self, agent: Arc<AgentHandle>) -> Result<(), HubError> {
        self.request(|done| Command::Register { agent, done }).await
    }

    /// Remove an agent and close its mailbox. Unknown ids are a no-op.
    pub async fn unregister(&self, id: ConnectionId) -> Result<(), HubError> {
        self.request(|done| Command::Unregister { id, done }).await
    }

    /// Route a frame.
    pub async fn dispatch(&self, frame: Frame, route: Route) -> Result<DispatchOutcome, HubError> {
        self.request(|reply| Command::Dispatch {
            frame,
            route,
            reply,
        })
        .await
    }

    /// Route a frame to the agent registered under `client_id`.
    pub async fn send_to(&self, client_id: &str, frame: Frame) -> Result<DispatchOutcome, HubError> {
        self.dispatch(frame, Route::Unicast(client_id.to_owned()))
            .await
    }

    /// Route a frame to every agent except `sender`.
    pub async fn broadcast_except(
        &self,
        sender: ConnectionId,
        frame: Frame,
    ) -> Result<DispatchOutcome, HubError> {
        self.dispatch(frame, Route::AllExcept(sender)).await
    }

    /// Route a frame to every agent.
    pub async fn broadcast_all(&self, frame: Frame) -> Result<DispatchOutcome, HubError> {
        self.dispatch(frame, Route::All).await
    }

    /// Number of registered agents.
    pub fn client_count(&self) -> usize {
        self.registry.read().len()
    }

    /// Sorted client ids of registered, non-anonymous agents.
    pub fn client_ids(&self) -> Vec<String> {
        self.registry.read().client_ids()
    }

    /// Summaries of every registered agent, oldest first.
    pub fn clients(&self) -> Vec<ClientSummary> {
        let mut clients: Vec<ClientSummary> =
            self.registry.read().agents().map(|a| a.summary()).collect();
        clients.sort_by_key(|c| c.connection_id);
        clients
    }

    /// Whether the given connection is registered.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.registry.read().contains(id)
    }

    /// Whether the coordinator is still accepting commands.
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
