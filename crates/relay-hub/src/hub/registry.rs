//! Live connection registry.
//!
//! Primary index: connection id → agent. Secondary index: non-empty client
//! id → connection id. The secondary index only ever points at agents that
//! are present in the primary index.

use std::collections::HashMap;
use std::sync::Arc;

use crate::agent::{AgentHandle, ConnectionId};

/// Registry of currently registered agents.
#[derive(Default)]
pub(crate) struct Registry {
    agents: HashMap<ConnectionId, Arc<AgentHandle>>,
    by_client_id: HashMap<String, ConnectionId>,
}

impl Registry {
    /// Insert an agent.
    ///
    /// Returns the agent previously indexed under the same non-empty client
    /// id, already removed from both indexes. Re-inserting an agent that is
    /// already registered is a no-op.
    pub(crate) fn insert(&mut self, agent: Arc<AgentHandle>) -> Option<Arc<AgentHandle>> {
        let id = agent.id();
        if self.agents.contains_key(&id) {
            return None;
        }

        let displaced = if agent.client_id().is_empty() {
            None
        } else {
            let previous = self.by_client_id.insert(agent.client_id().to_owned(), id);
            previous.and_then(|prev| self.agents.remove(&prev))
        };

        let _ = self.agents.insert(id, agent);
        displaced
    }

    /// Remove an agent by connection id. Unknown ids are ignored.
    pub(crate) fn remove(&mut self, id: ConnectionId) -> Option<Arc<AgentHandle>> {
        let agent = self.agents.remove(&id)?;
        let client_id = agent.client_id();
        if !client_id.is_empty() && self.by_client_id.get(client_id) == Some(&id) {
            let _ = self.by_client_id.remove(client_id);
        }
        Some(agent)
    }

    /// Look up the agent currently holding a client id.
    pub(crate) fn lookup(&self, client_id: &str) -> Option<&Arc<AgentHandle>> {
        let id = self.by_client_id.get(client_id)?;
        self.agents.get(id)
    }

    pub(crate) fn contains(&self, id: ConnectionId) -> bool {
        self.agents.contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.agents.len()
    }

    /// Registered client ids, sorted.
    pub(crate) fn client_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.by_client_id.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn agents(&self) -> impl Iterator<Item = &Arc<AgentHandle>> {
        self.agents.values()
    }

    /// Remove every agent.
    pub(crate) fn drain(&mut self) -> Vec<Arc<AgentHandle>> {
        self.by_client_id.clear();
        self.agents.drain().map(|(_, agent)| agent).collect()
    }

    /// Every secondary entry resolves to a primary entry with a matching client id.
    #[cfg(test)]
    pub(crate) fn is_consistent(&self) -> bool {
        self.by_client_id.iter().all(|(client_id, id)| {
            self.agents
                .get(id)
                .is_some_and(|agent| agent.client_id() == client_id)
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
