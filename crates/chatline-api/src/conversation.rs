use chatline_db::last_page;
use chatline_db::models::MessageRow;
use chatline_types::api::{ConversationPage, MessageView};
use chatline_types::models::AttachmentRecord;

use crate::attachment::public_locator;
use crate::error::ApiResult;
use crate::state::AppStateInner;
use crate::storage::ObjectStore;

/// Client view of a stored message, with its attachment classified.
pub fn message_view(store: &dyn ObjectStore, row: MessageRow) -> MessageView {
    let attachment = AttachmentRecord::from_column(row.attachment.as_deref());
    let (locator, title, category) = match attachment {
        Some(record) => (
            Some(public_locator(store, &record.new_name)),
            Some(record.old_name),
            Some(record.category),
        ),
        None => (None, None, None),
    };

    MessageView {
        id: row.id,
        kind: row.kind,
        from_id: row.from_id,
        to_id: row.to_id,
        body: row.body,
        sent_by: row.sent_by,
        attachment: locator,
        attachment_title: title,
        attachment_type: category,
        seen: row.seen,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

/// Whole conversation between `viewer_id` and `peer_id`, oldest first.
/// Returns `None` when the peer has no account.
pub async fn fetch_full(
    state: &AppStateInner,
    viewer_id: i64,
    peer_id: i64,
) -> ApiResult<Option<ConversationPage>> {
    let db = state.db.clone();
    let rows = tokio::task::spawn_blocking(move || {
        let known = db.get_customer(peer_id)?.is_some() || db.driver_exists(peer_id)?;
        if !known {
            return Ok(None);
        }
        db.conversation_full(viewer_id, peer_id).map(Some)
    })
    .await??;

    let Some(rows) = rows else {
        return Ok(None);
    };

    let messages: Vec<MessageView> = rows
        .into_iter()
        .map(|row| message_view(state.store.as_ref(), row))
        .collect();

    Ok(Some(ConversationPage {
        total: messages.len() as u64,
        last_page: 1,
        last_message_id: messages.last().map(|m| m.id),
        messages,
    }))
}

/// One page of the conversation. Page 1 holds the newest messages; each
/// page is returned oldest first. `last_message_id` is the oldest message
/// on the page, the cursor for loading older history.
pub async fn fetch_page(
    state: &AppStateInner,
    viewer_id: i64,
    peer_id: i64,
    page: u32,
    per_page: u32,
) -> ApiResult<ConversationPage> {
    let page = page.max(1);
    let per_page = per_page.max(1);

    let db = state.db.clone();
    let result =
        tokio::task::spawn_blocking(move || db.conversation_page(viewer_id, peer_id, page, per_page))
            .await??;

    let last_message_id = result.items.last().map(|row| row.id);
    let messages: Vec<MessageView> = result
        .items
        .into_iter()
        .rev()
        .map(|row| message_view(state.store.as_ref(), row))
        .collect();

    Ok(ConversationPage {
        total: result.total,
        last_page: last_page(result.total, per_page),
        last_message_id,
        messages,
    })
}
