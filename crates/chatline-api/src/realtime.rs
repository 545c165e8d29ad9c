use axum::{Extension, Form, Json, extract::State, response::IntoResponse};
use tracing::debug;

use chatline_gateway::RealtimeError;
use chatline_types::api::{ChannelAuthRequest, ChannelAuthResponse};
use chatline_types::events::channel_owner;
use chatline_types::models::Principal;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// POST /chat/auth
///
/// Signs a Pusher private-channel subscription. Callers may only subscribe
/// to their own `private-chatify.<id>` channel. The Pusher client posts a
/// urlencoded form.
pub async fn channel_auth(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Form(req): Form<ChannelAuthRequest>,
) -> ApiResult<impl IntoResponse> {
    let Some(pusher) = state.pusher.as_ref() else {
        return Err(ApiError::NotFound("Realtime channel auth is not configured".to_string()));
    };

    if channel_owner(&req.channel_name) != Some(principal.id) {
        debug!(user = principal.id, channel = %req.channel_name, "Channel auth refused");
        return Err(ApiError::Forbidden);
    }

    let auth = pusher
        .authorize_channel(&req.socket_id, &req.channel_name)
        .map_err(|e| match e {
            RealtimeError::InvalidSocketId(_) => ApiError::BadRequest(e.to_string()),
            other => ApiError::internal(other),
        })?;

    Ok(Json(ChannelAuthResponse { auth }))
}
