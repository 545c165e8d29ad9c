//! The send path: attachment, persistence, realtime broadcast, push.
//!
//! Only attachment rejections reach the caller as a failure. Broadcast and
//! push are best-effort, so a successful response means the message was
//! stored, not that it was delivered.

use tracing::{debug, warn};

use chatline_db::models::NewMessage;
use chatline_types::api::{ErrorStatus, MessageView, SendResponse};
use chatline_types::events::{MESSAGING_EVENT, MessagingPayload, private_channel};
use chatline_types::models::{AttachmentCategory, Principal, RecipientClass, Role};

use crate::attachment::{Upload, store_upload};
use crate::conversation::message_view;
use crate::entities::{encode_entities, trim_text};
use crate::error::{ApiError, ApiResult};
use crate::state::AppStateInner;

/// Conversation type used when the client does not name one.
pub const DEFAULT_CONVERSATION_TYPE: &str = "user";

#[derive(Debug, Clone, Default)]
pub struct SendMessage {
    pub recipient_id: i64,
    pub conversation_type: Option<String>,
    pub body: String,
    pub upload: Option<Upload>,
    pub temp_id: Option<String>,
    /// Overrides the class derived from the conversation type.
    pub recipient_class: Option<RecipientClass>,
}

impl SendMessage {
    fn kind(&self) -> &str {
        self.conversation_type
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .unwrap_or(DEFAULT_CONVERSATION_TYPE)
    }

    fn class(&self) -> RecipientClass {
        self.recipient_class
            .unwrap_or_else(|| RecipientClass::from_conversation_type(self.kind()))
    }
}

/// Push title shown on the recipient's device.
pub fn push_title(principal: &Principal) -> &str {
    match principal.role {
        Role::User => principal.name.as_str(),
        Role::Admin => "Admin",
    }
}

pub async fn send(
    state: &AppStateInner,
    principal: &Principal,
    req: SendMessage,
) -> ApiResult<SendResponse> {
    let attachment = match &req.upload {
        Some(upload) => match store_upload(&state.policy, state.store.as_ref(), upload).await {
            Ok(record) => Some(record),
            Err(e) if e.is_rejection() => {
                debug!(sender = principal.id, file = %upload.file_name, "Attachment rejected: {}", e);
                return Ok(SendResponse {
                    status: 200,
                    error: ErrorStatus::rejected(e.to_string()),
                    message: None,
                    temp_id: req.temp_id,
                });
            }
            Err(e) => return Err(ApiError::internal(e)),
        },
        None => None,
    };

    let text = trim_text(&req.body).to_string();
    let body = encode_entities(&text);
    let kind = req.kind().to_string();
    let column = attachment.as_ref().map(|a| a.to_column());
    let sender_id = principal.id;
    let recipient_id = req.recipient_id;
    let sent_by = principal.role.as_str();

    let db = state.db.clone();
    let row = tokio::task::spawn_blocking(move || {
        db.insert_message(&NewMessage {
            kind: &kind,
            from_id: sender_id,
            to_id: recipient_id,
            body: &body,
            sent_by,
            attachment: column.as_deref(),
        })
    })
    .await??;

    let view = message_view(state.store.as_ref(), row);
    debug!(message_id = view.id, from = sender_id, to = recipient_id, "Message stored");

    broadcast(state, &view).await;

    let image = match view.attachment_type {
        Some(AttachmentCategory::Image) => view.attachment.as_deref(),
        _ => None,
    };
    let pushed = state
        .push
        .dispatch(req.class(), push_title(principal), &text, recipient_id, image)
        .await;
    debug!(message_id = view.id, pushed, "Push dispatch finished");

    Ok(SendResponse {
        status: 200,
        error: ErrorStatus::ok(),
        message: Some(view),
        temp_id: req.temp_id,
    })
}

async fn broadcast(state: &AppStateInner, view: &MessageView) {
    let payload = MessagingPayload {
        from_id: view.from_id,
        to_id: view.to_id,
        message: view.clone(),
    };
    let payload = match serde_json::to_value(&payload) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(message_id = view.id, "Failed to encode realtime payload: {}", e);
            return;
        }
    };

    let channel = private_channel(view.to_id);
    if let Err(e) = state.notifier.publish(&channel, MESSAGING_EVENT, payload).await {
        warn!(message_id = view.id, channel = %channel, "Realtime publish failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    use crate::test_support::TestContext;

    fn user(id: i64, name: &str) -> Principal {
        Principal {
            id,
            name: name.to_string(),
            role: Role::User,
            class: RecipientClass::Customer,
        }
    }

    fn text(to: i64, body: &str) -> SendMessage {
        SendMessage {
            recipient_id: to,
            body: body.to_string(),
            temp_id: Some("temp_17".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn text_message_is_sanitized_and_stored() {
        let ctx = TestContext::new();
        let (a, b) = (ctx.customer("Ann"), ctx.customer("Ben"));

        let res = send(&ctx.state, &user(a, "Ann"), text(b, "  <b>hi</b>  ")).await.unwrap();

        assert_eq!(res.status, 200);
        assert_eq!(res.error, ErrorStatus::ok());
        assert_eq!(res.temp_id.as_deref(), Some("temp_17"));
        let message = res.message.unwrap();
        assert_eq!(message.body, "&lt;b&gt;hi&lt;/b&gt;");
        assert!(!message.seen);
        assert_eq!(message.attachment, None);
        assert_eq!(message.sent_by, "user");
        assert_eq!(message.kind, "user");

        let stored = ctx.state.db.get_message(message.id).unwrap().unwrap();
        assert_eq!(stored.body, "&lt;b&gt;hi&lt;/b&gt;");
        assert_eq!(stored.attachment, None);
    }

    #[tokio::test]
    async fn message_is_broadcast_to_recipient_channel() {
        let ctx = TestContext::new();
        let (a, b) = (ctx.customer("Ann"), ctx.customer("Ben"));

        let res = send(&ctx.state, &user(a, "Ann"), text(b, "hello")).await.unwrap();

        let published = ctx.notifier.published();
        assert_eq!(published.len(), 1);
        let (channel, event, payload) = &published[0];
        assert_eq!(channel, &format!("private-chatify.{}", b));
        assert_eq!(event, "messaging");
        assert_eq!(payload["from_id"], a);
        assert_eq!(payload["to_id"], b);
        assert_eq!(payload["message"]["id"], res.message.unwrap().id);
    }

    #[tokio::test]
    async fn push_carries_sender_name_and_raw_text() {
        let ctx = TestContext::new();
        let (a, b) = (ctx.customer("Ann"), ctx.customer("Ben"));
        ctx.register_token("customer", b, "ben-phone");

        send(&ctx.state, &user(a, "Ann"), text(b, "  5 < 6  ")).await.unwrap();

        let pushes = ctx.customer_push.sent();
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].0, "ben-phone");
        assert_eq!(pushes[0].1.title, "Ann");
        assert_eq!(pushes[0].1.body, "5 < 6");
        assert_eq!(pushes[0].1.image, None);
    }

    #[tokio::test]
    async fn admin_push_goes_to_driver_pool() {
        let ctx = TestContext::new();
        let driver = ctx.driver("Dee");
        ctx.register_token("driver", driver, "dee-phone");
        let admin = Principal {
            id: 1,
            name: "Ops Desk".to_string(),
            role: Role::Admin,
            class: RecipientClass::Customer,
        };

        let res = send(
            &ctx.state,
            &admin,
            SendMessage {
                conversation_type: Some("driver".to_string()),
                ..text(driver, "Pickup moved")
            },
        )
        .await
        .unwrap();

        assert_eq!(res.message.unwrap().sent_by, "admin");
        assert!(ctx.customer_push.sent().is_empty());
        let pushes = ctx.driver_push.sent();
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].1.title, "Admin");
    }

    #[tokio::test]
    async fn explicit_recipient_class_wins() {
        let ctx = TestContext::new();
        let driver = ctx.driver("Dee");
        ctx.register_token("driver", driver, "dee-phone");

        send(
            &ctx.state,
            &user(2, "Ann"),
            SendMessage {
                recipient_class: Some(RecipientClass::Driver),
                ..text(driver, "on my way")
            },
        )
        .await
        .unwrap();

        assert_eq!(ctx.driver_push.sent().len(), 1);
    }

    #[tokio::test]
    async fn disallowed_extension_is_rejected_without_side_effects() {
        let ctx = TestContext::new();
        let (a, b) = (ctx.customer("Ann"), ctx.customer("Ben"));
        ctx.register_token("customer", b, "ben-phone");

        let res = send(
            &ctx.state,
            &user(a, "Ann"),
            SendMessage {
                upload: Some(Upload::new("tool.exe", Bytes::from_static(b"MZ"))),
                ..text(b, "see attached")
            },
        )
        .await
        .unwrap();

        assert_eq!(res.status, 200);
        assert_eq!(res.error.status, 1);
        assert_eq!(res.error.message.as_deref(), Some("File extension not allowed!"));
        assert!(res.message.is_none());
        assert_eq!(res.temp_id.as_deref(), Some("temp_17"));

        assert_eq!(ctx.state.db.conversation_full(a, b).unwrap().len(), 0);
        assert!(ctx.notifier.published().is_empty());
        assert!(ctx.customer_push.sent().is_empty());
        assert_eq!(ctx.store.len(), 0);
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected_without_side_effects() {
        let ctx = TestContext::new();
        let (a, b) = (ctx.customer("Ann"), ctx.customer("Ben"));
        ctx.register_token("customer", b, "ben-phone");
        let cap = ctx.state.policy.max_upload_bytes;

        for upload in [
            Upload::new("holiday.png", Bytes::from(vec![0u8; cap as usize])),
            Upload::oversized("holiday.png", cap * 3),
        ] {
            let res = send(
                &ctx.state,
                &user(a, "Ann"),
                SendMessage {
                    upload: Some(upload),
                    ..text(b, "big one")
                },
            )
            .await
            .unwrap();

            assert_eq!(res.status, 200);
            assert_eq!(
                res.error,
                ErrorStatus::rejected("File size you are trying to upload is too large!")
            );
            assert!(res.message.is_none());
            assert_eq!(res.temp_id.as_deref(), Some("temp_17"));
        }

        assert!(ctx.state.db.conversation_full(a, b).unwrap().is_empty());
        assert!(ctx.notifier.published().is_empty());
        assert!(ctx.customer_push.sent().is_empty());
        assert_eq!(ctx.store.len(), 0);
    }

    #[tokio::test]
    async fn non_ascii_body_uses_named_entities() {
        let ctx = TestContext::new();
        let (a, b) = (ctx.customer("Ann"), ctx.customer("Ben"));
        ctx.register_token("customer", b, "ben-phone");

        let res = send(&ctx.state, &user(a, "Ann"), text(b, "\u{a0}café €5\n")).await.unwrap();

        assert_eq!(res.message.unwrap().body, "&nbsp;caf&eacute; &euro;5");
        assert_eq!(ctx.customer_push.sent()[0].1.body, "\u{a0}café €5");
    }

    #[tokio::test]
    async fn image_category_matches_between_send_and_fetch() {
        let ctx = TestContext::new();
        let (a, b) = (ctx.customer("Ann"), ctx.customer("Ben"));
        ctx.register_token("customer", b, "ben-phone");

        let res = send(
            &ctx.state,
            &user(a, "Ann"),
            SendMessage {
                upload: Some(Upload::new("beach.JPG", Bytes::from_static(b"\xff\xd8\xff"))),
                ..text(b, "")
            },
        )
        .await
        .unwrap();

        let sent = res.message.unwrap();
        assert_eq!(sent.attachment_type, Some(AttachmentCategory::Image));
        assert_eq!(sent.attachment_title.as_deref(), Some("beach.JPG"));
        assert_eq!(sent.body, "");

        let fetched = crate::conversation::fetch_full(&ctx.state, b, a).await.unwrap().unwrap();
        assert_eq!(fetched.messages[0].attachment_type, sent.attachment_type);
        assert_eq!(fetched.messages[0].attachment, sent.attachment);

        // Image attachments are shown in the notification.
        assert_eq!(ctx.customer_push.sent()[0].1.image, sent.attachment);
    }

    #[tokio::test]
    async fn broadcast_failure_does_not_fail_the_send() {
        let ctx = TestContext::new();
        ctx.notifier.fail_next();
        let (a, b) = (ctx.customer("Ann"), ctx.customer("Ben"));

        let res = send(&ctx.state, &user(a, "Ann"), text(b, "hi")).await.unwrap();
        assert_eq!(res.error.status, 0);
        assert!(res.message.is_some());
    }
}
