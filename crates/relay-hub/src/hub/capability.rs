//! Narrow capability interface for components that push server-originated
//! messages or report status without owning the hub.

use async_trait::async_trait;

use super::{DispatchOutcome, Hub};
use crate::agent::ClientSummary;
use crate::envelope::Frame;
use crate::errors::HubError;

/// What an outside component may do with a hub.
#[async_trait]
pub trait MessageHub: Send + Sync {
    /// Deliver a frame to every connected client.
    async fn broadcast_to_all(&self, frame: Frame) -> Result<DispatchOutcome, HubError>;

    /// Deliver a frame to the client registered under `client_id`.
    async fn send_to_client(
        &self,
        client_id: &str,
        frame: Frame,
    ) -> Result<DispatchOutcome, HubError>;

    /// Number of connected clients.
    fn client_count(&self) -> usize;

    /// Identifiers of connected, non-anonymous clients.
    fn client_ids(&self) -> Vec<String>;

    /// Per-connection summaries, oldest first.
    fn clients(&self) -> Vec<ClientSummary>;
}

#[async_trait]
impl MessageHub for Hub {
    async fn broadcast_to_all(&self, frame: Frame) -> Result<DispatchOutcome, HubError> {
        self.broadcast_all(frame).await
    }

    async fn send_to_client(
        &self,
        client_id: &str,
        frame: Frame,
    ) -> Result<DispatchOutcome, HubError> {
        self.send_to(client_id, frame).await
    }

    fn client_count(&self) -> usize {
        Hub::client_count(self)
    }

    fn client_ids(&self) -> Vec<String> {
        Hub::client_ids(self)
    }

    fn clients(&self) -> Vec<ClientSummary> {
        Hub::clients(self)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::agent::AgentHandle;
    use crate::hub::{HubConfig, Undelivered};

    #[tokio::test]
    async fn hub_usable_through_trait_object() {
        let (hub, _handle) = Hub::start(&HubConfig::default(), CancellationToken::new());
        let (agent, mut rx) = AgentHandle::new("carol", 4, CancellationToken::new());
        hub.register(agent).await.unwrap();

        let directory: Arc<dyn MessageHub> = Arc::new(hub);
        assert_eq!(directory.client_count(), 1);
        assert_eq!(directory.client_ids(), vec!["carol"]);
        assert_eq!(directory.clients()[0].client_id, "carol");

        let hit = directory
            .send_to_client("carol", Arc::from("direct"))
            .await
            .unwrap();
        assert!(hit.is_delivered());
        assert_eq!(&*rx.recv().await.unwrap(), "direct");

        let miss = directory
            .send_to_client("dave", Arc::from("nobody"))
            .await
            .unwrap();
        assert_eq!(miss, DispatchOutcome::NotDelivered(Undelivered::TargetNotFound));

        let all = directory.broadcast_to_all(Arc::from("all")).await.unwrap();
        assert_eq!(all.recipients(), 1);
    }
}
