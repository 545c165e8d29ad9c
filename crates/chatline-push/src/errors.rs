use thiserror::Error;

#[derive(Error, Debug)]
pub enum PushError {
    #[error("Failed to read service account file: {0}")]
    CredentialsRead(#[from] std::io::Error),

    #[error("Failed to parse service account file: {0}")]
    CredentialsParse(#[from] serde_json::Error),

    #[error("Failed to parse private key: {0}")]
    KeyParse(String),

    #[error("Failed to encode JWT: {0}")]
    JwtEncode(String),

    #[error("Failed to get access token: {0}")]
    TokenRequest(String),

    #[error("Token request failed with status: {0}")]
    TokenRejected(u16),

    #[error("FCM send request failed: {0}")]
    SendRequest(String),

    #[error("FCM API error: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("Device token lookup failed: {0}")]
    TokenLookup(String),

    #[error("Token cache lock poisoned")]
    CachePoisoned,
}
