use async_trait::async_trait;
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use serde::Serialize;
use sha2::Sha256;
use tracing::debug;

use crate::notifier::{RealtimeError, RealtimeNotifier};

type HmacSha256 = Hmac<Sha256>;

/// Pusher application credentials.
#[derive(Debug, Clone)]
pub struct PusherConfig {
    pub app_id: String,
    pub key: String,
    pub secret: String,
    pub cluster: String,
}

/// Publishes events through the Pusher HTTP API and signs private-channel
/// subscriptions for browser clients.
pub struct PusherClient {
    config: PusherConfig,
    http_client: reqwest::Client,
}

#[derive(Serialize)]
struct TriggerBody<'a> {
    name: &'a str,
    channels: [&'a str; 1],
    /// Pusher expects event data as a JSON-encoded string.
    data: String,
}

impl PusherClient {
    pub fn new(config: PusherConfig, http_client: reqwest::Client) -> Self {
        Self { config, http_client }
    }

    pub fn key(&self) -> &str {
        &self.config.key
    }

    fn events_path(&self) -> String {
        format!("/apps/{}/events", self.config.app_id)
    }

    fn events_url(&self) -> String {
        format!("https://api-{}.pusher.com{}", self.config.cluster, self.events_path())
    }

    fn sign(&self, message: &str) -> Result<String, RealtimeError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(self.config.secret.as_bytes())
            .map_err(|e| RealtimeError::Request(e.to_string()))?;
        mac.update(message.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Signature for a private-channel subscription, as `key:signature`.
    pub fn authorize_channel(&self, socket_id: &str, channel: &str) -> Result<String, RealtimeError> {
        if !is_valid_socket_id(socket_id) {
            return Err(RealtimeError::InvalidSocketId(socket_id.to_string()));
        }
        let signature = self.sign(&format!("{}:{}", socket_id, channel))?;
        Ok(format!("{}:{}", self.config.key, signature))
    }

    /// Query string for a signed events request, `auth_signature` last.
    fn signed_query(&self, body: &str, timestamp: i64) -> Result<String, RealtimeError> {
        let body_md5 = hex::encode(Md5::digest(body.as_bytes()));
        let params = format!(
            "auth_key={}&auth_timestamp={}&auth_version=1.0&body_md5={}",
            self.config.key, timestamp, body_md5
        );
        let signature = self.sign(&format!("POST\n{}\n{}", self.events_path(), params))?;
        Ok(format!("{}&auth_signature={}", params, signature))
    }
}

/// Pusher socket ids look like `1234.5678`.
fn is_valid_socket_id(socket_id: &str) -> bool {
    match socket_id.split_once('.') {
        Some((a, b)) => {
            !a.is_empty()
                && !b.is_empty()
                && a.bytes().all(|c| c.is_ascii_digit())
                && b.bytes().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

#[async_trait]
impl RealtimeNotifier for PusherClient {
    async fn publish(
        &self,
        channel: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), RealtimeError> {
        let body = serde_json::to_string(&TriggerBody {
            name: event,
            channels: [channel],
            data: serde_json::to_string(&payload)?,
        })?;
        let query = self.signed_query(&body, chrono::Utc::now().timestamp())?;

        let response = self
            .http_client
            .post(format!("{}?{}", self.events_url(), query))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| RealtimeError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RealtimeError::Api {
                status: status.as_u16(),
                body,
            });
        }

        debug!(channel, event, "Published to Pusher");
        Ok(())
    }
}
