//! Database row types. These map directly to SQLite rows and stay
//! separate from the chatline-types API models.

#[derive(Debug, Clone, PartialEq)]
pub struct MessageRow {
    pub id: i64,
    pub kind: String,
    pub from_id: i64,
    pub to_id: i64,
    pub body: String,
    pub sent_by: String,
    /// Raw column text: JSON descriptor, bare locator, or NULL.
    pub attachment: Option<String>,
    pub seen: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Values for a message insert. Timestamps and `seen` are filled by the store.
pub struct NewMessage<'a> {
    pub kind: &'a str,
    pub from_id: i64,
    pub to_id: i64,
    pub body: &'a str,
    pub sent_by: &'a str,
    pub attachment: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustomerRow {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub active_status: bool,
    pub dark_mode: bool,
    pub messenger_color: Option<String>,
    pub created_at: String,
}

pub struct ContactRow {
    pub customer: CustomerRow,
    pub max_created_at: String,
}

pub struct FavoriteRow {
    pub id: i64,
    pub user_id: i64,
    pub favorite_id: i64,
    pub created_at: String,
}

/// One page of a paginated query plus the unpaginated row count.
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

/// Rows removed by a conversation delete, with their attachment columns so
/// the caller can clean up stored files.
pub struct DeletedMessages {
    pub count: usize,
    pub attachments: Vec<String>,
}
