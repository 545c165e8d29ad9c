use axum::{
    Extension, Json,
    extract::{Multipart, State},
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use chatline_types::api::{ActiveStatusRequest, ActiveStatusResponse, SettingsResponse};
use chatline_types::models::{Principal, basename};

use crate::attachment::{AVATAR_PREFIX, DEFAULT_AVATAR, Upload};
use crate::error::{ApiError, ApiResult};
use crate::form::Form;
use crate::state::{AppState, AppStateInner};

const MAX_COLOR_LEN: usize = 32;

/// POST /updateSettings
///
/// Multipart fields: `dark_mode` ("dark" turns it on, anything else off),
/// `messengerColor`, and an optional `avatar` image. `status` is 1 only when
/// a new avatar was stored; a rejected avatar sets `error` and `message`.
pub async fn update_settings(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let mut form = Form::read(multipart, state.policy.max_upload_bytes).await?;
    let id = principal.id;

    let dark_mode = form.text("dark_mode").map(|mode| mode.trim() == "dark");
    let color = form
        .text("messengerColor")
        .map(|c| c.trim().chars().take(MAX_COLOR_LEN).collect::<String>());

    if dark_mode.is_some() || color.is_some() {
        let db = state.db.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            if let Some(dark) = dark_mode {
                db.set_dark_mode(id, dark)?;
            }
            if let Some(color) = color {
                db.set_messenger_color(id, &color)?;
            }
            Ok(())
        })
        .await??;
    }

    let response = match form.take_file("avatar") {
        Some(upload) => replace_avatar(&state, id, &upload).await?,
        None => SettingsResponse {
            status: 0,
            error: 0,
            message: None,
        },
    };

    Ok(Json(response))
}

async fn replace_avatar(state: &AppStateInner, id: i64, upload: &Upload) -> ApiResult<SettingsResponse> {
    let ext = match state.policy.check_image(upload) {
        Ok(ext) => ext,
        Err(e) if e.is_rejection() => {
            return Ok(SettingsResponse {
                status: 0,
                error: 1,
                message: Some(e.to_string()),
            });
        }
        Err(e) => return Err(ApiError::internal(e)),
    };

    let name = format!("{}.{}", Uuid::new_v4(), ext);
    state
        .store
        .store(AVATAR_PREFIX, &name, &upload.bytes)
        .await
        .map_err(ApiError::internal)?;

    let db = state.db.clone();
    let stored = name.clone();
    let result = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let previous = db.get_customer(id)?.and_then(|c| c.avatar);
        let updated = db.set_avatar(id, &stored)?;
        Ok((previous, updated))
    })
    .await
    .map_err(ApiError::from)
    .and_then(|r| r.map_err(ApiError::from));

    let previous = match result {
        Ok((previous, updated)) if updated > 0 => previous,
        Ok(_) => {
            discard_avatar(state, id, &name).await;
            return Ok(SettingsResponse {
                status: 0,
                error: 0,
                message: None,
            });
        }
        Err(e) => {
            discard_avatar(state, id, &name).await;
            return Err(e);
        }
    };

    if let Some(previous) = previous.filter(|a| !a.is_empty() && a != DEFAULT_AVATAR) {
        if let Err(e) = state.store.delete(AVATAR_PREFIX, basename(&previous)).await {
            warn!(user = id, "Failed to delete previous avatar {}: {}", previous, e);
        }
    }

    info!(user = id, avatar = %name, "Avatar updated");
    Ok(SettingsResponse {
        status: 1,
        error: 0,
        message: None,
    })
}

/// Removes a freshly stored avatar that no account row points at.
async fn discard_avatar(state: &AppStateInner, id: i64, name: &str) {
    if let Err(e) = state.store.delete(AVATAR_PREFIX, name).await {
        warn!(user = id, "Failed to delete unused avatar {}: {}", name, e);
    }
}

/// POST /setActiveStatus
pub async fn set_active_status(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<ActiveStatusRequest>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let id = principal.id;
    let active = req.status > 0;
    let updated = tokio::task::spawn_blocking(move || db.set_active_status(id, active)).await??;

    Ok(Json(ActiveStatusResponse { status: updated > 0 }))
}
