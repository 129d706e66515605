//! The hub's serialized control path.

use std::sync::Arc;

use metrics::{counter, gauge};
use parking_lot::RwLock;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::registry::Registry;
use super::{Command, DispatchOutcome, Route, Undelivered};
use crate::agent::{AgentHandle, CloseReason, ConnectionId, Delivery};
use crate::envelope::Frame;
use crate::metrics::{
    CONNECTIONS_ACTIVE, DISPATCH_MISSES_TOTAL, FRAMES_ROUTED_TOTAL, MAILBOX_EVICTIONS_TOTAL,
};

/// Envelope kind sent to an agent displaced by a newer registration.
pub const REPLACED_KIND: &str = "session.replaced";

/// Owns registry mutation. Run exactly one per [`Hub`](super::Hub).
pub struct HubCoordinator {
    commands: mpsc::Receiver<Command>,
    registry: Arc<RwLock<Registry>>,
}

impl HubCoordinator {
    pub(crate) fn new(commands: mpsc::Receiver<Command>, registry: Arc<RwLock<Registry>>) -> Self {
        Self { commands, registry }
    }

    /// Process commands until `cancel` fires or every hub handle is dropped,
    /// then close every registered agent.
    #[instrument(skip_all, name = "hub")]
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("hub coordinator started");
        loop {
            let command = tokio::select! {
                () = cancel.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };
            self.handle(command);
        }
        self.stop();
    }

    fn handle(&self, command: Command) {
        match command {
            Command::Register { agent, done } => {
                self.register(agent);
                let _ = done.send(());
            }
            Command::Unregister { id, done } => {
                self.unregister(id);
                let _ = done.send(());
            }
            Command::Dispatch {
                frame,
                route,
                reply,
            } => {
                let outcome = self.dispatch(&frame, &route);
                let _ = reply.send(outcome);
            }
        }
    }

    fn register(&self, agent: Arc<AgentHandle>) {
        let (displaced, clients) = {
            let mut registry = self.registry.write();
            let displaced = registry.insert(agent.clone());
            (displaced, registry.len())
        };

        if let Some(old) = displaced {
            warn!(
                client_id = old.client_id(),
                old_connection_id = %old.id(),
                new_connection_id = %agent.id(),
                "client id re-registered, replacing previous connection"
            );
            if let Err(e) =
                old.send_message(REPLACED_KIND, json!({ "connectionId": agent.id() }))
            {
                debug!(error = %e, "failed to encode replacement notice");
            }
            let _ = old.close(CloseReason::Replaced);
        }

        info!(
            client_id = agent.client_id(),
            connection_id = %agent.id(),
            clients,
            "client registered"
        );
        record_active(clients);
    }

    fn unregister(&self, id: ConnectionId) {
        let (removed, clients) = {
            let mut registry = self.registry.write();
            let removed = registry.remove(id);
            (removed, registry.len())
        };

        let Some(agent) = removed else {
            debug!(connection_id = %id, "unregister ignored, connection not registered");
            return;
        };
        let _ = agent.close(CloseReason::Unregistered);
        info!(
            client_id = agent.client_id(),
            connection_id = %id,
            clients,
            "client unregistered"
        );
        record_active(clients);
    }

    fn dispatch(&self, frame: &Frame, route: &Route) -> DispatchOutcome {
        let outcome = match route {
            Route::Unicast(target) => self.unicast(target, frame),
            Route::AllExcept(sender) => self.fan_out(frame, Some(*sender)),
            Route::All => self.fan_out(frame, None),
        };
        if outcome.recipients() > 0 {
            counter!(FRAMES_ROUTED_TOTAL, "route" => route.as_str())
                .increment(outcome.recipients() as u64);
        }
        outcome
    }

    fn unicast(&self, target: &str, frame: &Frame) -> DispatchOutcome {
        let agent = self.registry.read().lookup(target).cloned();
        let Some(agent) = agent else {
            counter!(DISPATCH_MISSES_TOTAL).increment(1);
            debug!(target, "unicast target not registered");
            return DispatchOutcome::NotDelivered(Undelivered::TargetNotFound);
        };

        match agent.try_deliver(frame.clone()) {
            Delivery::Queued => DispatchOutcome::Delivered {
                recipients: 1,
                evicted: 0,
            },
            Delivery::Full => {
                self.evict(&[agent]);
                DispatchOutcome::NotDelivered(Undelivered::TargetEvicted)
            }
            Delivery::Closed => {
                self.forget(&[agent]);
                counter!(DISPATCH_MISSES_TOTAL).increment(1);
                DispatchOutcome::NotDelivered(Undelivered::TargetNotFound)
            }
        }
    }

    /// Deliver to every agent except `skip`.
    ///
    /// Mailbox checks happen under the read lock; removals are applied
    /// afterwards under the write lock.
    fn fan_out(&self, frame: &Frame, skip: Option<ConnectionId>) -> DispatchOutcome {
        let mut recipients = 0;
        let mut full = Vec::new();
        let mut closed = Vec::new();
        {
            let registry = self.registry.read();
            for agent in registry.agents() {
                if Some(agent.id()) == skip {
                    continue;
                }
                match agent.try_deliver(frame.clone()) {
                    Delivery::Queued => recipients += 1,
                    Delivery::Full => full.push(agent.clone()),
                    Delivery::Closed => closed.push(agent.clone()),
                }
            }
        }

        let evicted = full.len();
        if !full.is_empty() {
            self.evict(&full);
        }
        if !closed.is_empty() {
            self.forget(&closed);
        }
        debug!(recipients, evicted, "frame fanned out");
        DispatchOutcome::Delivered {
            recipients,
            evicted,
        }
    }

    /// Disconnect agents whose mailbox is full.
    fn evict(&self, agents: &[Arc<AgentHandle>]) {
        let clients = self.remove_all(agents);
        for agent in agents {
            warn!(
                client_id = agent.client_id(),
                connection_id = %agent.id(),
                dropped = agent.dropped_frames(),
                "mailbox full, disconnecting slow client"
            );
            let _ = agent.close(CloseReason::MailboxFull);
            counter!(MAILBOX_EVICTIONS_TOTAL).increment(1);
        }
        record_active(clients);
    }

    /// Drop agents that are already tearing down.
    fn forget(&self, agents: &[Arc<AgentHandle>]) {
        let clients = self.remove_all(agents);
        for agent in agents {
            debug!(connection_id = %agent.id(), "dropping closed connection from registry");
        }
        record_active(clients);
    }

    fn remove_all(&self, agents: &[Arc<AgentHandle>]) -> usize {
        let mut registry = self.registry.write();
        for agent in agents {
            let _ = registry.remove(agent.id());
        }
        registry.len()
    }

    fn stop(&mut self) {
        self.commands.close();
        let agents = self.registry.write().drain();
        info!(closing = agents.len(), "hub coordinator stopping");
        for agent in &agents {
            let _ = agent.close(CloseReason::Shutdown);
        }
        record_active(0);
    }
}

#[allow(clippy::cast_precision_loss)]
fn record_active(clients: usize) {
    gauge!(CONNECTIONS_ACTIVE).set(clients as f64);
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
