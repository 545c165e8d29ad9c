use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use tracing::debug;

use crate::dispatcher::PushTransport;
use crate::errors::PushError;
use crate::models::*;

const MESSAGING_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";

/// Cached tokens are reused until this many seconds before expiry.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Firebase Cloud Messaging client for one Firebase project.
///
/// Exchanges the service account's signed assertion for an OAuth2 access
/// token and sends FCM v1 messages with it.
pub struct FcmClient {
    credentials: ServiceAccountKey,
    token_cache: Mutex<Option<TokenCache>>,
    http_client: reqwest::Client,
}

impl FcmClient {
    pub fn new(credentials: ServiceAccountKey, http_client: reqwest::Client) -> Self {
        Self {
            credentials,
            token_cache: Mutex::new(None),
            http_client,
        }
    }

    /// Load a service account JSON file.
    pub fn from_file(path: &Path, http_client: reqwest::Client) -> Result<Self, PushError> {
        let raw = std::fs::read_to_string(path)?;
        let credentials: ServiceAccountKey = serde_json::from_str(&raw)?;
        Ok(Self::new(credentials, http_client))
    }

    pub fn project_id(&self) -> &str {
        &self.credentials.project_id
    }

    fn send_url(&self) -> String {
        format!(
            "https://fcm.googleapis.com/v1/projects/{}/messages:send",
            self.credentials.project_id
        )
    }

    /// Get an access token from the service account (cached until near expiry).
    pub async fn get_access_token(&self) -> Result<String, PushError> {
        {
            let cache = self.token_cache.lock().map_err(|_| PushError::CachePoisoned)?;
            if let Some(cached) = cache.as_ref() {
                if cached.expires_at > Utc::now().timestamp() + TOKEN_REFRESH_MARGIN_SECS {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let assertion = self.signed_assertion()?;
        let params = [
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", assertion.as_str()),
        ];

        let response = self
            .http_client
            .post(&self.credentials.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| PushError::TokenRequest(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PushError::TokenRejected(response.status().as_u16()));
        }

        let token_response: GoogleTokenResponse = response
            .json()
            .await
            .map_err(|e| PushError::TokenRequest(e.to_string()))?;

        let expires_at = Utc::now().timestamp() + token_response.expires_in;
        {
            let mut cache = self.token_cache.lock().map_err(|_| PushError::CachePoisoned)?;
            *cache = Some(TokenCache {
                access_token: token_response.access_token.clone(),
                expires_at,
            });
        }

        debug!(project = %self.credentials.project_id, "Refreshed FCM access token");
        Ok(token_response.access_token)
    }

    fn signed_assertion(&self) -> Result<String, PushError> {
        let now = Utc::now();
        let claims = JwtClaims {
            iss: self.credentials.client_email.clone(),
            sub: self.credentials.client_email.clone(),
            scope: MESSAGING_SCOPE.to_string(),
            aud: self.credentials.token_uri.clone(),
            exp: (now + Duration::hours(1)).timestamp(),
            iat: now.timestamp(),
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.credentials.private_key_id.clone();

        let key = EncodingKey::from_rsa_pem(self.credentials.private_key.as_bytes())
            .map_err(|e| PushError::KeyParse(e.to_string()))?;

        encode(&header, &claims, &key).map_err(|e| PushError::JwtEncode(e.to_string()))
    }
}

#[async_trait]
impl PushTransport for FcmClient {
    async fn send(&self, device_token: &str, notification: &PushNotification) -> Result<(), PushError> {
        let access_token = self.get_access_token().await?;
        let message = FcmMessage::for_device(device_token, notification);

        let response = self
            .http_client
            .post(self.send_url())
            .bearer_auth(access_token)
            .json(&message)
            .send()
            .await
            .map_err(|e| PushError::SendRequest(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let body: FcmApiResponse = response
                .json()
                .await
                .map_err(|e| PushError::SendRequest(e.to_string()))?;
            debug!(
                token_prefix = %token_prefix(device_token),
                name = ?body.name,
                "FCM accepted notification"
            );
            Ok(())
        } else {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            Err(PushError::Api {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// Device tokens are credentials; logs only ever carry a short prefix.
pub(crate) fn token_prefix(token: &str) -> &str {
    let end = token
        .char_indices()
        .nth(8)
        .map(|(i, _)| i)
        .unwrap_or(token.len());
    &token[..end]
}
