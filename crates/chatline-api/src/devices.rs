use std::sync::Arc;

use async_trait::async_trait;
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;

use chatline_db::Database;
use chatline_push::{DeviceTokenSource, PushError};
use chatline_types::api::{DeviceTokenRequest, DeviceTokenResponse};
use chatline_types::models::{Principal, RecipientClass};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// FCM registration tokens are opaque but never this long.
const MAX_TOKEN_LEN: usize = 4096;

/// Resolves device tokens from the `device_tokens` table.
pub struct DatabaseTokenSource {
    db: Arc<Database>,
}

impl DatabaseTokenSource {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DeviceTokenSource for DatabaseTokenSource {
    async fn device_tokens(
        &self,
        class: RecipientClass,
        recipient_id: i64,
    ) -> Result<Option<Vec<String>>, PushError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.device_tokens(class.as_str(), recipient_id))
            .await
            .map_err(|e| PushError::TokenLookup(e.to_string()))?
            .map_err(|e| PushError::TokenLookup(format!("{:#}", e)))
    }
}

fn validate_token(token: &str) -> ApiResult<&str> {
    let token = token.trim();
    if token.is_empty() || token.len() > MAX_TOKEN_LEN {
        return Err(ApiError::BadRequest("Invalid device token".to_string()));
    }
    Ok(token)
}

/// POST /device-tokens
pub async fn register_device_token(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<DeviceTokenRequest>,
) -> ApiResult<impl IntoResponse> {
    let token = validate_token(&req.token)?.to_string();

    let db = state.db.clone();
    let class = principal.class;
    let id = principal.id;
    let inserted =
        tokio::task::spawn_blocking(move || db.add_device_token(class.as_str(), id, &token)).await??;

    if inserted {
        info!(class = %class, recipient_id = id, "Registered device token");
    }

    let status = if inserted { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(DeviceTokenResponse { registered: true })))
}

/// DELETE /device-tokens
pub async fn remove_device_token(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<DeviceTokenRequest>,
) -> ApiResult<impl IntoResponse> {
    let token = validate_token(&req.token)?.to_string();

    let db = state.db.clone();
    let class = principal.class;
    let id = principal.id;
    let removed =
        tokio::task::spawn_blocking(move || db.remove_device_token(class.as_str(), id, &token)).await??;

    if !removed {
        return Err(ApiError::NotFound("Device token not found".to_string()));
    }

    info!(class = %class, recipient_id = id, "Removed device token");
    Ok(Json(DeviceTokenResponse { registered: false }))
}
