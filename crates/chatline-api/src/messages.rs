use axum::{
    Extension, Json,
    extract::{Multipart, Path, State},
    response::{IntoResponse, Response},
};
use tracing::{info, warn};

use chatline_types::api::{
    DeleteResponse, DownloadResponse, FetchMessagesRequest, IdRequest, LookupFailure, SeenResponse,
};
use chatline_types::models::{AttachmentRecord, Principal, RecipientClass, basename};

use crate::attachment::ATTACHMENT_PREFIX;
use crate::conversation::{fetch_full, fetch_page};
use crate::error::{ApiError, ApiResult};
use crate::form::Form;
use crate::pipeline::{self, SendMessage};
use crate::state::{AppState, AppStateInner};

const FILE_MISSING: &str = "Sorry, File does not exist in our server or may have been deleted!";

/// GET /messages/{peer_id}
pub async fn get_messages(
    State(state): State<AppState>,
    Path(peer_id): Path<i64>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Response> {
    match fetch_full(&state, principal.id, peer_id).await? {
        Some(page) => Ok(Json(page).into_response()),
        None => Ok(Json(LookupFailure {
            success: false,
            message: "Recipient not found".to_string(),
            data: None,
        })
        .into_response()),
    }
}

/// POST /fetchMessages
pub async fn fetch_messages(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<FetchMessagesRequest>,
) -> ApiResult<impl IntoResponse> {
    let page = fetch_page(
        &state,
        principal.id,
        req.id,
        req.page.unwrap_or(1),
        req.per_page.unwrap_or(state.per_page),
    )
    .await?;
    Ok(Json(page))
}

/// Builds a send request from the form fields clients post.
fn send_request(mut form: Form) -> ApiResult<SendMessage> {
    let recipient_id = form
        .text("id")
        .or_else(|| form.text("to_id"))
        .ok_or_else(|| ApiError::BadRequest("Recipient id is required".to_string()))?
        .trim()
        .parse::<i64>()
        .map_err(|_| ApiError::BadRequest("Recipient id must be a number".to_string()))?;

    let recipient_class: Option<RecipientClass> = form
        .text("recipient_class")
        .map(|c| c.trim().to_ascii_lowercase().parse())
        .transpose()
        .map_err(ApiError::BadRequest)?;

    Ok(SendMessage {
        recipient_id,
        conversation_type: form.text("type").map(str::to_string),
        body: form.raw_text("message").unwrap_or_default().to_string(),
        temp_id: form.raw_text("temporaryMsgId").map(str::to_string),
        recipient_class,
        upload: form.take_file("file").or_else(|| form.take_file("audio_data")),
    })
}

/// POST /messages/send
pub async fn send_message(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let form = Form::read(multipart, state.policy.max_upload_bytes).await?;
    let req = send_request(form)?;
    let response = pipeline::send(&state, &principal, req).await?;
    Ok(Json(response))
}

/// POST /messages/seen
pub async fn mark_seen(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<IdRequest>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let viewer = principal.id;
    tokio::task::spawn_blocking(move || db.mark_seen(req.id, viewer)).await??;
    Ok(Json(SeenResponse { status: true }))
}

/// Removes stored attachment files. Missing files and storage errors are
/// logged and skipped.
async fn remove_attachment_files(state: &AppStateInner, columns: &[String]) {
    for column in columns {
        let Some(record) = AttachmentRecord::from_column(Some(column)) else {
            continue;
        };
        let name = basename(&record.new_name);
        if let Err(e) = state.store.delete(ATTACHMENT_PREFIX, name).await {
            warn!("Failed to delete attachment {}: {}", name, e);
        }
    }
}

/// POST /conversation/delete
pub async fn delete_conversation(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<IdRequest>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let viewer = principal.id;
    let deleted = tokio::task::spawn_blocking(move || db.delete_conversation(viewer, req.id)).await??;

    remove_attachment_files(&state, &deleted.attachments).await;
    info!(
        viewer,
        peer = req.id,
        messages = deleted.count,
        files = deleted.attachments.len(),
        "Conversation deleted"
    );

    Ok(Json(DeleteResponse {
        deleted: u8::from(deleted.count > 0),
    }))
}

/// POST /messages/delete
pub async fn delete_message(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<IdRequest>,
) -> ApiResult<impl IntoResponse> {
    let db = state.db.clone();
    let viewer = principal.id;
    let removed = tokio::task::spawn_blocking(move || db.delete_message(req.id, viewer))
        .await??
        .ok_or_else(|| ApiError::NotFound("Message not found".to_string()))?;

    if let Some(column) = removed.attachment {
        remove_attachment_files(&state, &[column]).await;
    }

    Ok(Json(DeleteResponse { deleted: 1 }))
}

/// GET /download/{file_name}
pub async fn download(
    State(state): State<AppState>,
    Path(file_name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let exists = state
        .store
        .exists(ATTACHMENT_PREFIX, &file_name)
        .await
        .map_err(ApiError::internal)?;

    if !exists {
        return Err(ApiError::NotFound(FILE_MISSING.to_string()));
    }

    let download_path = state.store.url(ATTACHMENT_PREFIX, &file_name);
    Ok(Json(DownloadResponse {
        file_name,
        download_path,
    }))
}
