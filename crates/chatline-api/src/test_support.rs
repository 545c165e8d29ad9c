//! In-process fakes and fixtures shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use jsonwebtoken::{EncodingKey, Header, encode};

use chatline_db::Database;
use chatline_gateway::{PusherClient, PusherConfig, RealtimeError, RealtimeNotifier};
use chatline_push::{PushDispatcher, PushError, PushNotification, PushRouter, PushTransport};
use chatline_types::api::Claims;
use chatline_types::models::{RecipientClass, Role};

use crate::attachment::AttachmentPolicy;
use crate::devices::DatabaseTokenSource;
use crate::state::{AppState, AppStateInner};
use crate::storage::{ObjectStore, StorageError};

pub const TEST_SECRET: &str = "test-secret";

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, Bytes>>,
}

impl MemoryStore {
    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn put(&self, prefix: &str, name: &str) {
        self.objects
            .lock()
            .unwrap()
            .insert(format!("{}/{}", prefix, name), Bytes::new());
    }

    pub fn contains(&self, prefix: &str, name: &str) -> bool {
        self.objects
            .lock()
            .unwrap()
            .contains_key(&format!("{}/{}", prefix, name))
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn store(&self, prefix: &str, name: &str, bytes: &[u8]) -> Result<String, StorageError> {
        self.objects
            .lock()
            .unwrap()
            .insert(format!("{}/{}", prefix, name), Bytes::copy_from_slice(bytes));
        Ok(self.url(prefix, name))
    }

    async fn exists(&self, prefix: &str, name: &str) -> Result<bool, StorageError> {
        Ok(self.contains(prefix, name))
    }

    async fn delete(&self, prefix: &str, name: &str) -> Result<(), StorageError> {
        self.objects
            .lock()
            .unwrap()
            .remove(&format!("{}/{}", prefix, name));
        Ok(())
    }

    fn url(&self, prefix: &str, name: &str) -> String {
        format!("memory://{}/{}", prefix, name)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    published: Mutex<Vec<(String, String, serde_json::Value)>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn published(&self) -> Vec<(String, String, serde_json::Value)> {
        self.published.lock().unwrap().clone()
    }

    pub fn fail_next(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RealtimeNotifier for RecordingNotifier {
    async fn publish(
        &self,
        channel: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), RealtimeError> {
        if self.fail.swap(false, Ordering::SeqCst) {
            return Err(RealtimeError::Request("connection refused".to_string()));
        }
        self.published
            .lock()
            .unwrap()
            .push((channel.to_string(), event.to_string(), payload));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, PushNotification)>>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<(String, PushNotification)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushTransport for RecordingTransport {
    async fn send(&self, device_token: &str, notification: &PushNotification) -> Result<(), PushError> {
        self.sent
            .lock()
            .unwrap()
            .push((device_token.to_string(), notification.clone()));
        Ok(())
    }
}

pub fn test_policy() -> AttachmentPolicy {
    AttachmentPolicy {
        allowed_images: ["png", "jpg", "jpeg", "gif", "webp"].map(String::from).to_vec(),
        allowed_files: ["zip", "rar", "txt", "pdf", "doc", "docx", "mp3", "wav", "ogg", "m4a", "aac", "opus"]
            .map(String::from)
            .to_vec(),
        max_upload_bytes: 1024 * 1024,
    }
}

pub fn token_for(id: i64, name: &str, role: Role, class: RecipientClass, secret: &str) -> String {
    let claims = Claims {
        sub: id,
        name: name.to_string(),
        role,
        class,
        exp: 4_102_444_800,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
}

/// A fully wired state over an in-memory database and recording fakes.
pub struct TestContext {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub customer_push: Arc<RecordingTransport>,
    pub driver_push: Arc<RecordingTransport>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Same as [`new`](Self::new) with Pusher channel signing enabled.
    pub fn with_pusher() -> Self {
        let pusher = PusherClient::new(
            PusherConfig {
                app_id: "1".to_string(),
                key: "test-key".to_string(),
                secret: "test-pusher-secret".to_string(),
                cluster: "mt1".to_string(),
            },
            reqwest::Client::new(),
        );
        Self::build(Some(Arc::new(pusher)))
    }

    fn build(pusher: Option<Arc<PusherClient>>) -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store = Arc::new(MemoryStore::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let customer_push = Arc::new(RecordingTransport::default());
        let driver_push = Arc::new(RecordingTransport::default());

        let tokens = Arc::new(DatabaseTokenSource::new(db.clone()));
        let push = PushRouter::new(
            Some(PushDispatcher::new(
                RecipientClass::Customer,
                customer_push.clone(),
                tokens.clone(),
            )),
            Some(PushDispatcher::new(RecipientClass::Driver, driver_push.clone(), tokens)),
        );

        let state = Arc::new(AppStateInner {
            db,
            jwt_secret: TEST_SECRET.to_string(),
            store: store.clone(),
            notifier: notifier.clone(),
            push,
            pusher,
            policy: test_policy(),
            per_page: 30,
        });

        Self {
            state,
            store,
            notifier,
            customer_push,
            driver_push,
        }
    }

    pub fn customer(&self, name: &str) -> i64 {
        let email = format!("{}@example.com", name.to_lowercase());
        self.state.db.create_customer(name, Some(&email)).unwrap()
    }

    pub fn driver(&self, name: &str) -> i64 {
        self.state.db.create_driver(name).unwrap()
    }

    pub fn register_token(&self, class: &str, id: i64, token: &str) {
        self.state.db.add_device_token(class, id, token).unwrap();
    }

    pub fn bearer(&self, id: i64, name: &str) -> String {
        format!(
            "Bearer {}",
            token_for(id, name, Role::User, RecipientClass::Customer, TEST_SECRET)
        )
    }
}
