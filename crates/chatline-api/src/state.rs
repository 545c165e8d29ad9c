use std::sync::Arc;

use chatline_db::Database;
use chatline_gateway::{PusherClient, RealtimeNotifier};
use chatline_push::PushRouter;

use crate::attachment::AttachmentPolicy;
use crate::storage::ObjectStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub store: Arc<dyn ObjectStore>,
    pub notifier: Arc<dyn RealtimeNotifier>,
    pub push: PushRouter,
    /// Present when realtime goes through Pusher; signs channel subscriptions.
    pub pusher: Option<Arc<PusherClient>>,
    pub policy: AttachmentPolicy,
    pub per_page: u32,
}
