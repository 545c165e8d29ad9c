use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RealtimeError {
    #[error("Failed to encode event payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Realtime publish request failed: {0}")]
    Request(String),

    #[error("Realtime API error: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("Invalid socket id: {0}")]
    InvalidSocketId(String),
}

/// Publishes a named event on a channel.
#[async_trait]
pub trait RealtimeNotifier: Send + Sync {
    async fn publish(
        &self,
        channel: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), RealtimeError>;
}
