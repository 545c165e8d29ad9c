//! Push notification delivery for chat messages.
//!
//! One [`PushDispatcher`] exists per recipient class (customer, driver). Each
//! owns its own FCM credentials and resolves device tokens through a
//! [`DeviceTokenSource`]. Delivery is best-effort: every token gets one
//! independent send and individual failures are only logged.

pub mod client;
pub mod dispatcher;
pub mod errors;
pub mod models;

pub use client::FcmClient;
pub use dispatcher::{DeviceTokenSource, PushDispatcher, PushRouter, PushTransport};
pub use errors::PushError;
pub use models::{PushNotification, ServiceAccountKey};
