use serde::{Deserialize, Serialize};

use crate::models::{AttachmentCategory, RecipientClass, Role};

// -- JWT Claims --

/// Bearer-token claims shared by the REST middleware and the realtime
/// gateway. Tokens are minted by the host application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub class: RecipientClass,
    pub exp: usize,
}

// -- Messages --

/// `{status, message}` error slot of the send envelope. `status` is 0 on
/// success and 1 when the attachment was rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorStatus {
    pub status: u8,
    pub message: Option<String>,
}

impl ErrorStatus {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            status: 1,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResponse {
    pub status: u16,
    pub error: ErrorStatus,
    pub message: Option<MessageView>,
    #[serde(rename = "tempID")]
    pub temp_id: Option<String>,
}

/// A message as returned to clients and pushed over the realtime channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageView {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub from_id: i64,
    pub to_id: i64,
    pub body: String,
    pub sent_by: String,
    pub attachment: Option<String>,
    pub attachment_title: Option<String>,
    pub attachment_type: Option<AttachmentCategory>,
    pub seen: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationPage {
    pub total: u64,
    pub last_page: u64,
    pub last_message_id: Option<i64>,
    pub messages: Vec<MessageView>,
}

/// Benign 200 body for lookups of an account that does not exist.
#[derive(Debug, Serialize)]
pub struct LookupFailure {
    pub success: bool,
    pub message: String,
    pub data: Option<()>,
}

#[derive(Debug, Deserialize)]
pub struct FetchMessagesRequest {
    pub id: i64,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct IdRequest {
    pub id: i64,
}

#[derive(Debug, Serialize)]
pub struct SeenResponse {
    pub status: bool,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: u8,
}

#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub file_name: String,
    pub download_path: String,
}

// -- Accounts --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerView {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub avatar: String,
    pub active_status: bool,
    pub dark_mode: bool,
    pub messenger_color: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ContactView {
    #[serde(flatten)]
    pub customer: CustomerView,
    pub max_created_at: String,
}

#[derive(Debug, Serialize)]
pub struct ContactsResponse {
    pub contacts: Vec<ContactView>,
    pub total: u64,
    pub last_page: u64,
}

#[derive(Debug, Deserialize)]
pub struct UserIdRequest {
    pub user_id: i64,
}

#[derive(Debug, Serialize)]
pub struct FavoriteResponse {
    pub status: u8,
}

#[derive(Debug, Serialize)]
pub struct FavoriteView {
    pub id: i64,
    pub user_id: i64,
    pub favorite_id: i64,
    pub created_at: String,
    pub user: Option<CustomerView>,
}

#[derive(Debug, Serialize)]
pub struct FavoritesResponse {
    pub total: usize,
    pub favorites: Vec<FavoriteView>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub input: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub records: Vec<CustomerView>,
    pub total: u64,
    pub last_page: u64,
}

#[derive(Debug, Serialize)]
pub struct SharedPhotosResponse {
    pub shared: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct IdInfoResponse {
    pub favorite: bool,
    pub fetch: Option<CustomerView>,
    pub user_avatar: Option<String>,
}

// -- Settings --

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub status: u8,
    pub error: u8,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ActiveStatusRequest {
    pub status: i64,
}

#[derive(Debug, Serialize)]
pub struct ActiveStatusResponse {
    pub status: bool,
}

// -- Realtime --

#[derive(Debug, Deserialize)]
pub struct ChannelAuthRequest {
    pub channel_name: String,
    pub socket_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelAuthResponse {
    pub auth: String,
}

// -- Device tokens --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceTokenRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct DeviceTokenResponse {
    pub registered: bool,
}
