//! Attachment validation, storage and classification.

use bytes::Bytes;
use thiserror::Error;
use uuid::Uuid;

use chatline_types::models::{AttachmentRecord, extension};

use crate::entities::{encode_entities, trim_text};
use crate::storage::{ObjectStore, StorageError};

/// Storage folder for message attachments.
pub const ATTACHMENT_PREFIX: &str = "profile_files";

/// Storage folder for user avatars.
pub const AVATAR_PREFIX: &str = "users-avatar";

/// Avatar name of accounts that never uploaded one.
pub const DEFAULT_AVATAR: &str = "avatar.png";

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("File extension not allowed!")]
    UnsupportedExtension,

    #[error("File size you are trying to upload is too large!")]
    TooLarge,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl AttachmentError {
    /// Rejections are reported to the sender in the response body; storage
    /// failures are server errors.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::UnsupportedExtension | Self::TooLarge)
    }
}

/// A file received in a multipart request.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    /// Buffered content. Empty once the file grew past the upload cap.
    pub bytes: Bytes,
    /// Bytes received for the field, buffered or not.
    pub size: u64,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            file_name: file_name.into(),
            size: bytes.len() as u64,
            bytes,
        }
    }

    /// A file that was counted but not kept.
    pub fn oversized(file_name: impl Into<String>, size: u64) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: Bytes::new(),
            size,
        }
    }
}

/// Which uploads are accepted.
#[derive(Debug, Clone)]
pub struct AttachmentPolicy {
    pub allowed_images: Vec<String>,
    pub allowed_files: Vec<String>,
    /// Uploads must be strictly smaller than this.
    pub max_upload_bytes: u64,
}

impl AttachmentPolicy {
    /// Checks size, then extension against images and files. Returns the
    /// lower-cased extension.
    pub fn check(&self, upload: &Upload) -> Result<String, AttachmentError> {
        self.check_against(upload, true)
    }

    /// Same as [`check`](Self::check) but only images are accepted.
    pub fn check_image(&self, upload: &Upload) -> Result<String, AttachmentError> {
        self.check_against(upload, false)
    }

    fn check_against(&self, upload: &Upload, include_files: bool) -> Result<String, AttachmentError> {
        if upload.size >= self.max_upload_bytes {
            return Err(AttachmentError::TooLarge);
        }

        let ext = extension(trim_text(&upload.file_name)).to_ascii_lowercase();
        let allowed = self.allowed_images.iter().any(|e| *e == ext)
            || (include_files && self.allowed_files.iter().any(|e| *e == ext));
        if ext.is_empty() || !allowed {
            return Err(AttachmentError::UnsupportedExtension);
        }
        Ok(ext)
    }
}

/// Validates and stores an upload under [`ATTACHMENT_PREFIX`] with a fresh
/// UUID name. The record points at the stored object's public URL.
pub async fn store_upload(
    policy: &AttachmentPolicy,
    store: &dyn ObjectStore,
    upload: &Upload,
) -> Result<AttachmentRecord, AttachmentError> {
    let ext = policy.check(upload)?;
    let name = format!("{}.{}", Uuid::new_v4(), ext);
    let url = store.store(ATTACHMENT_PREFIX, &name, &upload.bytes).await?;
    Ok(AttachmentRecord::new(url, encode_entities(trim_text(&upload.file_name))))
}

/// Public locator of a stored attachment. Current rows already hold a URL;
/// legacy rows hold a bare storage name.
pub fn public_locator(store: &dyn ObjectStore, new_name: &str) -> String {
    if is_absolute(new_name) {
        new_name.to_string()
    } else {
        store.url(ATTACHMENT_PREFIX, new_name)
    }
}

fn is_absolute(locator: &str) -> bool {
    locator.contains("://")
}

/// Public URL of an avatar name.
pub fn avatar_url(store: &dyn ObjectStore, avatar: Option<&str>) -> String {
    let name = avatar.filter(|a| !a.is_empty()).unwrap_or(DEFAULT_AVATAR);
    if is_absolute(name) {
        name.to_string()
    } else {
        store.url(AVATAR_PREFIX, name)
    }
}
