use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Who originated a message. Stored verbatim in `messages.sent_by`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Which account pool a push recipient lives in. Each class has its own
/// device-token pool and its own push credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientClass {
    #[default]
    Customer,
    Driver,
}

impl RecipientClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Driver => "driver",
        }
    }

    /// Conversation types addressed to drivers route pushes to the driver
    /// pool; everything else is a customer conversation.
    pub fn from_conversation_type(kind: &str) -> Self {
        match kind.trim().to_ascii_lowercase().as_str() {
            "driver" | "rider" => Self::Driver,
            _ => Self::Customer,
        }
    }
}

impl fmt::Display for RecipientClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecipientClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "driver" => Ok(Self::Driver),
            other => Err(format!("unknown recipient class '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentCategory {
    Image,
    Audio,
    File,
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "m4a", "aac", "opus", "flac", "wma", "aiff"];

impl AttachmentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
            Self::File => "file",
        }
    }

    /// Category of a stored name or URL, from its extension alone. Query
    /// strings and fragments are ignored.
    pub fn from_locator(locator: &str) -> Self {
        let ext = extension(locator).to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Self::Image
        } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            Self::Audio
        } else {
            Self::File
        }
    }
}

/// Last path segment of a locator, without query string or fragment.
pub fn basename(locator: &str) -> &str {
    let path = locator.split(['?', '#']).next().unwrap_or(locator);
    path.rsplit('/').next().unwrap_or(path)
}

/// Extension of a locator's basename, as written. Empty when there is none.
pub fn extension(locator: &str) -> &str {
    match basename(locator).rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext,
        _ => "",
    }
}

/// A message attachment after normalization. `category` is always derived
/// from `new_name` and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRecord {
    /// Public URL (current uploads) or bare storage name (legacy rows).
    pub new_name: String,
    /// Client-supplied filename, entity-encoded.
    pub old_name: String,
    pub category: AttachmentCategory,
}

/// On-disk shape of the `messages.attachment` column.
#[derive(Serialize, Deserialize)]
struct StoredAttachment {
    new_name: String,
    old_name: String,
}

impl AttachmentRecord {
    pub fn new(new_name: impl Into<String>, old_name: impl Into<String>) -> Self {
        let new_name = new_name.into();
        let category = AttachmentCategory::from_locator(&new_name);
        Self {
            new_name,
            old_name: old_name.into(),
            category,
        }
    }

    /// Reads the attachment column. Accepts the JSON descriptor and legacy
    /// rows holding a bare locator; those use the locator's basename as title.
    pub fn from_column(raw: Option<&str>) -> Option<Self> {
        let raw = raw?.trim();
        if raw.is_empty() || raw == "null" {
            return None;
        }
        match serde_json::from_str::<StoredAttachment>(raw) {
            Ok(stored) => Some(Self::new(stored.new_name, stored.old_name)),
            Err(_) => Some(Self::new(raw, basename(raw))),
        }
    }

    pub fn to_column(&self) -> String {
        serde_json::json!({
            "new_name": self.new_name,
            "old_name": self.old_name,
        })
        .to_string()
    }
}

/// The authenticated caller, resolved once per request by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: i64,
    pub name: String,
    pub role: Role,
    pub class: RecipientClass,
}
