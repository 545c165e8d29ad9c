use std::sync::Arc;

use async_trait::async_trait;
use chatline_types::models::RecipientClass;
use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::client::token_prefix;
use crate::errors::PushError;
use crate::models::PushNotification;

/// Delivers one notification to one device.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn send(&self, device_token: &str, notification: &PushNotification) -> Result<(), PushError>;
}

/// Resolves the registered devices of a recipient.
///
/// `Ok(None)` means the recipient does not exist in that class's directory.
#[async_trait]
pub trait DeviceTokenSource: Send + Sync {
    async fn device_tokens(
        &self,
        class: RecipientClass,
        recipient_id: i64,
    ) -> Result<Option<Vec<String>>, PushError>;
}

/// Push delivery for a single recipient class.
#[derive(Clone)]
pub struct PushDispatcher {
    class: RecipientClass,
    transport: Arc<dyn PushTransport>,
    tokens: Arc<dyn DeviceTokenSource>,
}

impl PushDispatcher {
    pub fn new(
        class: RecipientClass,
        transport: Arc<dyn PushTransport>,
        tokens: Arc<dyn DeviceTokenSource>,
    ) -> Self {
        Self {
            class,
            transport,
            tokens,
        }
    }

    pub fn class(&self) -> RecipientClass {
        self.class
    }

    /// Notify every device of `recipient_id`.
    ///
    /// Returns false when the recipient is unknown or has no devices, true
    /// once a send was attempted for each token. Failed sends do not abort
    /// the remaining ones and do not change the result.
    pub async fn dispatch(
        &self,
        title: &str,
        body: &str,
        recipient_id: i64,
        image: Option<&str>,
    ) -> bool {
        let tokens = match self.tokens.device_tokens(self.class, recipient_id).await {
            Ok(Some(tokens)) => tokens,
            Ok(None) => {
                debug!(class = %self.class, recipient_id, "Push skipped, recipient not found");
                return false;
            }
            Err(e) => {
                warn!(class = %self.class, recipient_id, "Device token lookup failed: {}", e);
                return false;
            }
        };

        if tokens.is_empty() {
            debug!(class = %self.class, recipient_id, "Push skipped, no registered devices");
            return false;
        }

        let notification = PushNotification {
            title: title.to_string(),
            body: body.to_string(),
            image: image.map(str::to_string),
        };

        let sends = tokens.iter().map(|token| {
            let transport = Arc::clone(&self.transport);
            let notification = &notification;
            async move {
                let result = transport.send(token, notification).await;
                if let Err(e) = &result {
                    warn!(
                        token_prefix = %token_prefix(token),
                        "Push send failed: {}", e
                    );
                }
                result.is_ok()
            }
        });

        let results = join_all(sends).await;
        let delivered = results.iter().filter(|ok| **ok).count();

        info!(
            class = %self.class,
            recipient_id,
            devices = tokens.len(),
            delivered,
            failed = tokens.len() - delivered,
            "Push dispatched"
        );

        true
    }
}

/// Selects the dispatcher for a recipient class. A class without configured
/// credentials has no dispatcher and its pushes are skipped.
#[derive(Clone, Default)]
pub struct PushRouter {
    customer: Option<PushDispatcher>,
    driver: Option<PushDispatcher>,
}

impl PushRouter {
    pub fn new(customer: Option<PushDispatcher>, driver: Option<PushDispatcher>) -> Self {
        Self { customer, driver }
    }

    pub fn for_class(&self, class: RecipientClass) -> Option<&PushDispatcher> {
        match class {
            RecipientClass::Customer => self.customer.as_ref(),
            RecipientClass::Driver => self.driver.as_ref(),
        }
    }

    pub async fn dispatch(
        &self,
        class: RecipientClass,
        title: &str,
        body: &str,
        recipient_id: i64,
        image: Option<&str>,
    ) -> bool {
        match self.for_class(class) {
            Some(dispatcher) => dispatcher.dispatch(title, body, recipient_id, image).await,
            None => {
                debug!(class = %class, "Push disabled for recipient class");
                false
            }
        }
    }
}
