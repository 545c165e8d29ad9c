//! HTTP handlers for the chat feature: messages, contacts, favorites,
//! attachments, settings and device tokens.

pub mod attachment;
pub mod contacts;
pub mod conversation;
pub mod devices;
pub mod entities;
pub mod error;
pub mod form;
pub mod messages;
pub mod middleware;
pub mod pipeline;
pub mod realtime;
pub mod settings;
pub mod state;
pub mod storage;

#[cfg(test)]
mod test_support;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
};

use crate::middleware::require_auth;
use crate::state::AppState;

/// Every chat route. All of them require a bearer token.
///
/// The multipart routes have no body limit. `Form::read` enforces the
/// upload cap per file so an oversized file gets the normal rejection
/// response instead of a cut stream.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/messages/{peer_id}", get(messages::get_messages))
        .route("/fetchMessages", post(messages::fetch_messages))
        .route(
            "/messages/send",
            post(messages::send_message).layer(DefaultBodyLimit::disable()),
        )
        .route("/messages/seen", post(messages::mark_seen))
        .route("/messages/delete", post(messages::delete_message))
        .route("/conversation/delete", post(messages::delete_conversation))
        .route("/download/{file_name}", get(messages::download))
        .route("/contacts", get(contacts::get_contacts))
        .route("/favorite", post(contacts::toggle_favorite))
        .route("/favorites", get(contacts::get_favorites))
        .route("/search", get(contacts::search))
        .route("/shared-photos", get(contacts::shared_photos))
        .route("/idInfo", post(contacts::id_info))
        .route(
            "/updateSettings",
            post(settings::update_settings).layer(DefaultBodyLimit::disable()),
        )
        .route("/setActiveStatus", post(settings::set_active_status))
        .route("/chat/auth", post(realtime::channel_auth))
        .route(
            "/device-tokens",
            post(devices::register_device_token).delete(devices::remove_device_token),
        )
        .route_layer(from_fn_with_state(state.clone(), require_auth))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use chatline_db::models::NewMessage;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::test_support::TestContext;

    async fn call(ctx: &TestContext, req: Request<Body>) -> (StatusCode, Value) {
        let res = router(ctx.state.clone()).oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn get_as(ctx: &TestContext, viewer: i64, uri: &str) -> Request<Body> {
        Request::get(uri)
            .header(header::AUTHORIZATION, ctx.bearer(viewer, "viewer"))
            .body(Body::empty())
            .unwrap()
    }

    fn post_json(ctx: &TestContext, viewer: i64, uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::AUTHORIZATION, ctx.bearer(viewer, "viewer"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn insert(ctx: &TestContext, from: i64, to: i64, attachment: Option<&str>) -> i64 {
        ctx.state
            .db
            .insert_message(&NewMessage {
                kind: "user",
                from_id: from,
                to_id: to,
                body: "hello",
                sent_by: "user",
                attachment,
            })
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn missing_token_is_unauthenticated() {
        let ctx = TestContext::new();
        let req = Request::get("/contacts").body(Body::empty()).unwrap();
        let (status, body) = call(&ctx, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "error": "Unauthenticated" }));

        let req = Request::get("/contacts")
            .header(header::AUTHORIZATION, "Bearer not-a-jwt")
            .body(Body::empty())
            .unwrap();
        assert_eq!(call(&ctx, req).await.0, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_peer_is_a_benign_failure() {
        let ctx = TestContext::new();
        let ann = ctx.customer("Ann");
        let (status, body) = call(&ctx, get_as(&ctx, ann, "/messages/999")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "success": false, "message": "Recipient not found", "data": null })
        );
    }

    #[tokio::test]
    async fn multipart_send_echoes_temp_id() {
        let ctx = TestContext::new();
        let (ann, ben) = (ctx.customer("Ann"), ctx.customer("Ben"));

        let boundary = "XchatlineX";
        let form = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"id\"\r\n\r\n{ben}\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"message\"\r\n\r\n  <i>yo</i> \r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"temporaryMsgId\"\r\n\r\ntemp_9\r\n\
             --{b}--\r\n",
            b = boundary,
            ben = ben
        );
        let req = Request::post("/messages/send")
            .header(header::AUTHORIZATION, ctx.bearer(ann, "Ann"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(form))
            .unwrap();

        let (status, body) = call(&ctx, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], 200);
        assert_eq!(body["error"], json!({ "status": 0, "message": null }));
        assert_eq!(body["tempID"], "temp_9");
        assert_eq!(body["message"]["body"], "&lt;i&gt;yo&lt;/i&gt;");
        assert_eq!(body["message"]["from_id"], ann);
        assert_eq!(body["message"]["to_id"], ben);
        assert_eq!(body["message"]["type"], "user");
    }

    fn multipart_with_file(
        ctx: &TestContext,
        viewer: i64,
        uri: &str,
        texts: &[(&str, String)],
        file: (&str, &str, Vec<u8>),
    ) -> Request<Body> {
        let boundary = "XchatlineX";
        let (field, file_name, data) = file;
        let mut body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n",
            b = boundary
        )
        .into_bytes();
        body.extend_from_slice(&data);
        body.extend_from_slice(b"\r\n");
        for (name, value) in texts {
            body.extend_from_slice(
                format!(
                    "--{b}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n",
                    b = boundary
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

        Request::post(uri)
            .header(header::AUTHORIZATION, ctx.bearer(viewer, "viewer"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn upload_far_above_cap_gets_size_rejection() {
        let ctx = TestContext::new();
        let (ann, ben) = (ctx.customer("Ann"), ctx.customer("Ben"));
        ctx.register_token("customer", ben, "ben-phone");

        let req = multipart_with_file(
            &ctx,
            ann,
            "/messages/send",
            &[("id", ben.to_string()), ("temporaryMsgId", "temp_big".to_string())],
            ("file", "big.png", vec![0u8; 3 * 1024 * 1024]),
        );

        let (status, body) = call(&ctx, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], 200);
        assert_eq!(
            body["error"],
            json!({ "status": 1, "message": "File size you are trying to upload is too large!" })
        );
        assert_eq!(body["tempID"], "temp_big");
        assert!(body["message"].is_null());

        assert!(ctx.state.db.conversation_full(ann, ben).unwrap().is_empty());
        assert!(ctx.notifier.published().is_empty());
        assert!(ctx.customer_push.sent().is_empty());
        assert_eq!(ctx.store.len(), 0);
    }

    #[tokio::test]
    async fn upload_under_cap_is_stored() {
        let ctx = TestContext::new();
        let (ann, ben) = (ctx.customer("Ann"), ctx.customer("Ben"));

        let req = multipart_with_file(
            &ctx,
            ann,
            "/messages/send",
            &[("id", ben.to_string())],
            ("file", "notes.pdf", vec![7u8; 600 * 1024]),
        );

        let (status, body) = call(&ctx, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error"]["status"], 0);
        assert_eq!(body["message"]["attachment_title"], "notes.pdf");
        assert_eq!(ctx.store.len(), 1);
    }

    #[tokio::test]
    async fn oversized_avatar_gets_size_rejection() {
        let ctx = TestContext::new();
        let ann = ctx.customer("Ann");

        let req = multipart_with_file(
            &ctx,
            ann,
            "/updateSettings",
            &[("messengerColor", "#2180f3".to_string())],
            ("avatar", "me.png", vec![0u8; 3 * 1024 * 1024]),
        );

        let (status, body) = call(&ctx, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], 0);
        assert_eq!(body["error"], 1);
        assert_eq!(body["message"], "File size you are trying to upload is too large!");
        assert_eq!(ctx.store.len(), 0);
        let customer = ctx.state.db.get_customer(ann).unwrap().unwrap();
        assert_eq!(customer.messenger_color.as_deref(), Some("#2180f3"));
    }

    #[tokio::test]
    async fn fetch_messages_paginates() {
        let ctx = TestContext::new();
        let (ann, ben) = (ctx.customer("Ann"), ctx.customer("Ben"));
        for _ in 0..5 {
            insert(&ctx, ann, ben, None);
        }

        let (status, body) = call(
            &ctx,
            post_json(&ctx, ann, "/fetchMessages", json!({ "id": ben, "page": 2, "per_page": 2 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 5);
        assert_eq!(body["last_page"], 3);
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn seen_marks_incoming_messages() {
        let ctx = TestContext::new();
        let (ann, ben) = (ctx.customer("Ann"), ctx.customer("Ben"));
        let id = insert(&ctx, ben, ann, None);

        let (status, body) = call(&ctx, post_json(&ctx, ann, "/messages/seen", json!({ "id": ben }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": true }));
        assert!(ctx.state.db.get_message(id).unwrap().unwrap().seen);
    }

    #[tokio::test]
    async fn favorite_toggles_and_lists() {
        let ctx = TestContext::new();
        let (ann, ben) = (ctx.customer("Ann"), ctx.customer("Ben"));

        let (_, first) = call(&ctx, post_json(&ctx, ann, "/favorite", json!({ "user_id": ben }))).await;
        assert_eq!(first, json!({ "status": 1 }));

        let (_, list) = call(&ctx, get_as(&ctx, ann, "/favorites")).await;
        assert_eq!(list["total"], 1);
        assert_eq!(list["favorites"][0]["favorite_id"], ben);
        assert_eq!(list["favorites"][0]["user"]["name"], "Ben");

        let (_, info) = call(&ctx, post_json(&ctx, ann, "/idInfo", json!({ "id": ben }))).await;
        assert_eq!(info["favorite"], true);
        assert_eq!(info["fetch"]["name"], "Ben");
        assert_eq!(info["user_avatar"], "memory://users-avatar/avatar.png");

        let (_, second) = call(&ctx, post_json(&ctx, ann, "/favorite", json!({ "user_id": ben }))).await;
        assert_eq!(second, json!({ "status": 0 }));
        assert!(!ctx.state.db.is_favorite(ann, ben).unwrap());
    }

    #[tokio::test]
    async fn contacts_exclude_viewer_and_put_recent_first() {
        let ctx = TestContext::new();
        let (ann, ben, cat) = (ctx.customer("Ann"), ctx.customer("Ben"), ctx.customer("Cat"));
        insert(&ctx, ann, ben, None);
        insert(&ctx, cat, ann, None);
        insert(&ctx, ann, ann, None);

        let (status, body) = call(&ctx, get_as(&ctx, ann, "/contacts")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);
        assert_eq!(body["last_page"], 1);
        let names: Vec<&str> = body["contacts"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Cat", "Ben"]);
        assert!(body["contacts"][0]["max_created_at"].is_string());
    }

    #[tokio::test]
    async fn search_matches_name_and_skips_viewer() {
        let ctx = TestContext::new();
        let ann = ctx.customer("Ann");
        ctx.customer("Annabel");
        ctx.customer("Bob");

        let (_, body) = call(&ctx, get_as(&ctx, ann, "/search?input=%20ann%20")).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["records"][0]["name"], "Annabel");
    }

    #[tokio::test]
    async fn shared_photos_lists_images_only() {
        let ctx = TestContext::new();
        let (ann, ben) = (ctx.customer("Ann"), ctx.customer("Ben"));
        insert(&ctx, ann, ben, Some(r#"{"new_name":"https://cdn/p/1.png","old_name":"1.png"}"#));
        insert(&ctx, ben, ann, Some(r#"{"new_name":"https://cdn/p/2.pdf","old_name":"2.pdf"}"#));
        insert(&ctx, ben, ann, Some("3.jpg"));

        let (_, body) = call(&ctx, get_as(&ctx, ann, &format!("/shared-photos?user_id={}", ben))).await;
        assert_eq!(
            body,
            json!({ "shared": ["memory://profile_files/3.jpg", "https://cdn/p/1.png"] })
        );
    }

    #[tokio::test]
    async fn delete_conversation_removes_files() {
        let ctx = TestContext::new();
        let (ann, ben) = (ctx.customer("Ann"), ctx.customer("Ben"));
        ctx.store.put("profile_files", "f.png");
        insert(&ctx, ann, ben, Some(r#"{"new_name":"memory://profile_files/f.png","old_name":"f.png"}"#));
        insert(&ctx, ben, ann, None);

        let (_, body) = call(&ctx, post_json(&ctx, ann, "/conversation/delete", json!({ "id": ben }))).await;
        assert_eq!(body, json!({ "deleted": 1 }));
        assert!(ctx.state.db.conversation_full(ann, ben).unwrap().is_empty());
        assert!(!ctx.store.contains("profile_files", "f.png"));

        let (_, again) = call(&ctx, post_json(&ctx, ann, "/conversation/delete", json!({ "id": ben }))).await;
        assert_eq!(again, json!({ "deleted": 0 }));
    }

    #[tokio::test]
    async fn only_the_sender_deletes_a_message() {
        let ctx = TestContext::new();
        let (ann, ben) = (ctx.customer("Ann"), ctx.customer("Ben"));
        let id = insert(&ctx, ann, ben, None);

        let (status, _) = call(&ctx, post_json(&ctx, ben, "/messages/delete", json!({ "id": id }))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(&ctx, post_json(&ctx, ann, "/messages/delete", json!({ "id": id }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "deleted": 1 }));
    }

    #[tokio::test]
    async fn download_reports_missing_files() {
        let ctx = TestContext::new();
        let ann = ctx.customer("Ann");
        ctx.store.put("profile_files", "here.pdf");

        let (status, body) = call(&ctx, get_as(&ctx, ann, "/download/here.pdf")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "file_name": "here.pdf", "download_path": "memory://profile_files/here.pdf" })
        );

        let (status, body) = call(&ctx, get_as(&ctx, ann, "/download/gone.pdf")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            body["message"],
            "Sorry, File does not exist in our server or may have been deleted!"
        );
    }

    #[tokio::test]
    async fn active_status_updates_account() {
        let ctx = TestContext::new();
        let ann = ctx.customer("Ann");

        let (_, body) = call(&ctx, post_json(&ctx, ann, "/setActiveStatus", json!({ "status": 1 }))).await;
        assert_eq!(body, json!({ "status": true }));
        assert!(ctx.state.db.get_customer(ann).unwrap().unwrap().active_status);
    }

    #[tokio::test]
    async fn device_tokens_register_and_remove() {
        let ctx = TestContext::new();
        let ann = ctx.customer("Ann");

        let (status, _) = call(&ctx, post_json(&ctx, ann, "/device-tokens", json!({ "token": "fcm-1" }))).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = call(&ctx, post_json(&ctx, ann, "/device-tokens", json!({ "token": "fcm-1" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            ctx.state.db.device_tokens("customer", ann).unwrap(),
            Some(vec!["fcm-1".to_string()])
        );

        let req = Request::delete("/device-tokens")
            .header(header::AUTHORIZATION, ctx.bearer(ann, "Ann"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "token": "fcm-1" }).to_string()))
            .unwrap();
        assert_eq!(call(&ctx, req).await.0, StatusCode::OK);
        assert_eq!(ctx.state.db.device_tokens("customer", ann).unwrap(), Some(vec![]));
    }

    fn channel_auth(ctx: &TestContext, viewer: i64, channel: &str) -> Request<Body> {
        Request::post("/chat/auth")
            .header(header::AUTHORIZATION, ctx.bearer(viewer, "viewer"))
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!("socket_id=123.456&channel_name={}", channel)))
            .unwrap()
    }

    #[tokio::test]
    async fn channel_auth_only_signs_own_channel() {
        let ctx = TestContext::with_pusher();
        let ann = ctx.customer("Ann");

        let (status, body) = call(&ctx, channel_auth(&ctx, ann, &format!("private-chatify.{}", ann))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["auth"].as_str().unwrap().starts_with("test-key:"));

        let (status, _) = call(&ctx, channel_auth(&ctx, ann, "private-chatify.9999")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn channel_auth_without_pusher() {
        let ctx = TestContext::new();
        let ann = ctx.customer("Ann");
        let (status, _) = call(&ctx, channel_auth(&ctx, ann, &format!("private-chatify.{}", ann))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
