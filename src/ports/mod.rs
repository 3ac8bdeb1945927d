//! Collaborator ports consumed by the engine, with in-process implementations.

pub mod broadcast;
pub mod directory;
pub mod notify;

pub use broadcast::{
    BroadcastPort, ConnectionId, ConnectionManager, DomainEvent, EventKind, WsBroadcaster,
    WsMessage, WsSender,
};
pub use directory::{InMemoryDirectory, UserDirectory, UserProfile};
pub use notify::{LogNotifier, Notification, NotificationPort, notify_best_effort};

use std::sync::Arc;

/// The collaborators every engine component talks to.
#[derive(Clone)]
pub struct Ports {
    pub directory: Arc<dyn UserDirectory>,
    pub notifier: Arc<dyn NotificationPort>,
    pub broadcast: Arc<dyn BroadcastPort>,
}
