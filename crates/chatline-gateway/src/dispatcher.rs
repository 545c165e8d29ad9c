use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};
use tracing::trace;
use uuid::Uuid;

use chatline_types::events::GatewayEvent;

use crate::notifier::{RealtimeError, RealtimeNotifier};

/// Tracks connected WebSocket clients by channel and routes events to them.
///
/// A user may hold several connections (phone and browser); every connection
/// bound to a channel receives the channel's events.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    /// channel -> (conn_id -> sender)
    channels: RwLock<HashMap<String, HashMap<Uuid, mpsc::UnboundedSender<GatewayEvent>>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a new connection to `channel`. Returns (conn_id, receiver).
    pub async fn register(&self, channel: &str) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .channels
            .write()
            .await
            .entry(channel.to_string())
            .or_default()
            .insert(conn_id, tx);
        (conn_id, rx)
    }

    /// Remove a connection. Empty channels are dropped.
    pub async fn unregister(&self, channel: &str, conn_id: Uuid) {
        let mut channels = self.inner.channels.write().await;
        if let Some(conns) = channels.get_mut(channel) {
            conns.remove(&conn_id);
            if conns.is_empty() {
                channels.remove(channel);
            }
        }
    }

    /// Deliver an event to every connection on `channel`. Returns how many
    /// connections accepted it.
    pub async fn send_to_channel(&self, channel: &str, event: GatewayEvent) -> usize {
        let channels = self.inner.channels.read().await;
        let Some(conns) = channels.get(channel) else {
            return 0;
        };

        conns
            .values()
            .filter(|tx| tx.send(event.clone()).is_ok())
            .count()
    }

    pub async fn connection_count(&self, channel: &str) -> usize {
        self.inner
            .channels
            .read()
            .await
            .get(channel)
            .map_or(0, HashMap::len)
    }
}

#[async_trait]
impl RealtimeNotifier for Dispatcher {
    async fn publish(
        &self,
        channel: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), RealtimeError> {
        let delivered = self
            .send_to_channel(
                channel,
                GatewayEvent::Event {
                    channel: channel.to_string(),
                    event: event.to_string(),
                    payload,
                },
            )
            .await;
        trace!(channel, event, delivered, "Published to local gateway");
        Ok(())
    }
}
