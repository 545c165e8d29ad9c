use serde::{Deserialize, Serialize};

use crate::api::MessageView;

/// Event name used for new-message notifications.
pub const MESSAGING_EVENT: &str = "messaging";

/// Private channel a participant listens on for their incoming messages.
pub fn private_channel(user_id: i64) -> String {
    format!("private-chatify.{}", user_id)
}

/// Extracts the owner id from a `private-chatify.<id>` channel name.
pub fn channel_owner(channel: &str) -> Option<i64> {
    channel.strip_prefix("private-chatify.")?.parse().ok()
}

/// Payload of the `messaging` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingPayload {
    pub from_id: i64,
    pub to_id: i64,
    pub message: MessageView,
}

/// Frames sent over the in-process WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms the connection and names the channel it is bound to
    Ready { user_id: i64, channel: String },

    /// An event published on the connection's channel
    Event {
        channel: String,
        event: String,
        payload: serde_json::Value,
    },
}
