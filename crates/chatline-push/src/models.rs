use serde::{Deserialize, Serialize};

/// Provider-agnostic notification content.
#[derive(Debug, Clone, PartialEq)]
pub struct PushNotification {
    pub title: String,
    pub body: String,
    pub image: Option<String>,
}

/// Google service account key file, as downloaded from the Firebase console.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAccountKey {
    pub project_id: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    pub private_key: String,
    pub client_email: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// OAuth2 Token Cache
#[derive(Debug, Clone)]
pub struct TokenCache {
    pub access_token: String,
    pub expires_at: i64,
}

/// JWT Claims for Google OAuth2
#[derive(Debug, Serialize)]
pub struct JwtClaims {
    pub iss: String,
    pub sub: String,
    pub scope: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
}

/// Google OAuth2 Token Response
#[derive(Debug, Deserialize)]
pub struct GoogleTokenResponse {
    pub access_token: String,
    pub expires_in: i64,
}

/// FCM v1 request body
#[derive(Debug, Serialize)]
pub struct FcmMessage {
    pub message: FcmMessageContent,
}

#[derive(Debug, Serialize)]
pub struct FcmMessageContent {
    pub token: String,
    pub notification: FcmNotification,
    pub data: FcmData,
    pub apns: ApnsConfig,
    pub android: AndroidConfig,
}

#[derive(Debug, Serialize)]
pub struct FcmNotification {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Data payload. Clients only use `message_id` to correlate, and the
/// deployed apps expect the constant "1".
#[derive(Debug, Serialize)]
pub struct FcmData {
    pub message_id: String,
}

#[derive(Debug, Serialize)]
pub struct ApnsConfig {
    pub headers: ApnsHeaders,
    pub payload: ApnsPayload,
}

#[derive(Debug, Serialize)]
pub struct ApnsHeaders {
    #[serde(rename = "apns-priority")]
    pub apns_priority: String,
}

#[derive(Debug, Serialize)]
pub struct ApnsPayload {
    pub aps: Aps,
}

#[derive(Debug, Serialize)]
pub struct Aps {
    pub sound: String,
}

#[derive(Debug, Serialize)]
pub struct AndroidConfig {
    pub priority: String,
    pub notification: AndroidNotification,
}

#[derive(Debug, Serialize)]
pub struct AndroidNotification {
    pub sound: String,
}

impl FcmMessage {
    /// High priority with the default sound on both mobile platforms.
    pub fn for_device(token: &str, notification: &PushNotification) -> Self {
        Self {
            message: FcmMessageContent {
                token: token.to_string(),
                notification: FcmNotification {
                    title: notification.title.clone(),
                    body: notification.body.clone(),
                    image: notification.image.clone(),
                },
                data: FcmData {
                    message_id: "1".to_string(),
                },
                apns: ApnsConfig {
                    headers: ApnsHeaders {
                        apns_priority: "10".to_string(),
                    },
                    payload: ApnsPayload {
                        aps: Aps {
                            sound: "default".to_string(),
                        },
                    },
                },
                android: AndroidConfig {
                    priority: "high".to_string(),
                    notification: AndroidNotification {
                        sound: "default".to_string(),
                    },
                },
            },
        }
    }
}

/// FCM API Response
#[derive(Debug, Deserialize)]
pub struct FcmApiResponse {
    pub name: Option<String>,
}
