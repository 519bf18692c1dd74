//! In-memory registry of connected listeners.
//!
//! Clients are ephemeral: one entry per live connection, created on
//! connect and dropped on disconnect, never persisted. Delivery is a
//! single non-blocking send on a bounded channel; a full channel drops
//! the call for that client only and never blocks the fan-out.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use radiocast_core::access::AccessScope;
use radiocast_core::call::Call;
use radiocast_core::config::UserConfig;

use crate::delayer::Delayer;

/// One connected listener.
pub struct Client {
    pub id: Uuid,
    /// The authenticated user behind this connection, when the API key
    /// matched one. Anonymous ingest-side connections carry `None`.
    pub user: Option<Arc<UserConfig>>,
    /// Access scope derived from the user (or key) at connect time.
    pub scope: AccessScope,
    tx: mpsc::Sender<Arc<Call>>,
}

impl Client {
    /// Create a client and the receiving half of its bounded channel.
    pub fn new(
        user: Option<Arc<UserConfig>>,
        scope: AccessScope,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Arc<Call>>) {
        let (tx, rx) = mpsc::channel(capacity);
        let client = Arc::new(Self {
            id: Uuid::new_v4(),
            user,
            scope,
            tx,
        });
        (client, rx)
    }

    /// Non-blocking delivery. A full or closed channel drops the call
    /// for this client; neither outcome is surfaced to the sender.
    pub fn try_deliver(&self, call: &Arc<Call>) {
        match self.tx.try_send(Arc::clone(call)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(client_id = %self.id, call_id = call.id, "client channel full, dropping call");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(client_id = %self.id, call_id = call.id, "client channel closed, dropping call");
            }
        }
    }
}

/// Thread-safe registry of connected listeners.
#[derive(Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<Uuid, Arc<Client>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, client: Arc<Client>) {
        info!(client_id = %client.id, authenticated = client.user.is_some(), "listener connected");
        self.clients.write().await.insert(client.id, client);
    }

    pub async fn unregister(&self, id: Uuid) -> Option<Arc<Client>> {
        let client = self.clients.write().await.remove(&id);
        if client.is_some() {
            info!(client_id = %id, "listener disconnected");
        } else {
            warn!(client_id = %id, "tried to unregister unknown listener");
        }
        client
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Snapshot of the current connection set.
    pub async fn clients(&self) -> Vec<Arc<Client>> {
        self.clients.read().await.values().cloned().collect()
    }

    /// Fan a released call out to every scoped client. Per-client
    /// secondary delays are honored by handing each delivery to the
    /// delayer, which delivers immediately when nothing remains.
    pub async fn emit_call(&self, call: &Arc<Call>, delayer: &Arc<Delayer>) {
        for client in self.clients().await {
            if !client
                .scope
                .has_talkgroup_access(call.system_ref, call.talkgroup_ref)
            {
                continue;
            }
            delayer.delay_for_client(Arc::clone(call), client).await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn call(id: i64, system: u32, talkgroup: u32) -> Arc<Call> {
        Arc::new(Call::new(
            id,
            system,
            talkgroup,
            1_700_000_000_000,
            vec![0u8; 8],
            "audio/mpeg".into(),
        ))
    }

    #[tokio::test]
    async fn register_and_unregister() {
        let registry = ClientRegistry::new();
        let (client, _rx) = Client::new(None, AccessScope::Unrestricted, 4);
        let id = client.id;

        registry.register(client).await;
        assert_eq!(registry.client_count().await, 1);

        assert!(registry.unregister(id).await.is_some());
        assert_eq!(registry.client_count().await, 0);
        assert!(registry.unregister(id).await.is_none());
    }

    #[tokio::test]
    async fn try_deliver_drops_on_full_channel() {
        let (client, mut rx) = Client::new(None, AccessScope::Unrestricted, 1);

        client.try_deliver(&call(1, 5, 101));
        // Channel now full; the second call is dropped without blocking.
        client.try_deliver(&call(2, 5, 101));

        assert_eq!(rx.recv().await.unwrap().id, 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn try_deliver_ignores_closed_channel() {
        let (client, rx) = Client::new(None, AccessScope::Unrestricted, 1);
        drop(rx);
        // Must not panic.
        client.try_deliver(&call(1, 5, 101));
    }
}
