//! Realtime delivery of chat events.
//!
//! Two [`RealtimeNotifier`] backends exist: [`PusherClient`] publishes through
//! the Pusher REST API, and the in-process [`Dispatcher`] fans events out to
//! WebSocket connections served by [`connection`].

pub mod connection;
pub mod dispatcher;
pub mod notifier;
pub mod pusher;

pub use dispatcher::Dispatcher;
pub use notifier::{RealtimeError, RealtimeNotifier};
pub use pusher::{PusherClient, PusherConfig};
