//! Push of case/offer/status events to connected users.
//!
//! `ConnectionManager` keeps the live WebSocket senders per user (several
//! per user: mobile + web). `WsBroadcaster` routes a `DomainEvent` to every
//! connection of each recipient.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::case::CaseStatus;
use crate::core_types::{CaseId, OfferId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    CaseStatusChanged,
    OfferSubmitted,
    OfferAccepted,
    OfferWithdrawn,
    OfferExpired,
    PaymentUpdated,
    SolutionUpdated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainEvent {
    pub kind: EventKind,
    pub case_id: CaseId,
    pub status: Option<CaseStatus>,
    pub offer_id: Option<OfferId>,
    #[serde(skip)]
    pub recipients: Vec<UserId>,
    pub at: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(kind: EventKind, case_id: CaseId, recipients: Vec<UserId>) -> Self {
        Self {
            kind,
            case_id,
            status: None,
            offer_id: None,
            recipients,
            at: Utc::now(),
        }
    }

    pub fn with_status(mut self, status: CaseStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_offer(mut self, offer_id: OfferId) -> Self {
        self.offer_id = Some(offer_id);
        self
    }
}

pub trait BroadcastPort: Send + Sync {
    /// Fire and forget.
    fn publish(&self, event: DomainEvent);
}

// ============================================================================
// WebSocket fan-out
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    Connected { user_id: UserId },
    Event(DomainEvent),
    Pong,
}

pub type WsSender = mpsc::UnboundedSender<WsMessage>;

pub type ConnectionId = u64;

pub struct ConnectionManager {
    connections: DashMap<UserId, Vec<(ConnectionId, WsSender)>>,
    next_conn_id: AtomicU64,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_conn_id: AtomicU64::new(1),
        }
    }

    pub fn add_connection(&self, user_id: UserId, tx: WsSender) -> ConnectionId {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let mut senders = self.connections.entry(user_id).or_default();
        senders.push((conn_id, tx));
        tracing::info!(
            user_id = %user_id,
            conn_id,
            total_connections = senders.len(),
            "WebSocket connection added"
        );
        conn_id
    }

    pub fn remove_connection(&self, user_id: UserId, conn_id: ConnectionId) {
        let now_empty = match self.connections.get_mut(&user_id) {
            Some(mut senders) => {
                senders.retain(|(id, _)| *id != conn_id);
                senders.is_empty()
            }
            None => return,
        };
        if now_empty {
            self.connections.remove_if(&user_id, |_, senders| senders.is_empty());
            tracing::info!(user_id = %user_id, conn_id, "All WebSocket connections closed");
        }
    }

    pub fn send_to_user(&self, user_id: UserId, message: &WsMessage) {
        if let Some(senders) = self.connections.get(&user_id) {
            for (conn_id, tx) in senders.iter() {
                if tx.send(message.clone()).is_err() {
                    tracing::warn!(user_id = %user_id, conn_id, "Failed to send - client disconnected");
                }
            }
        }
    }

    /// (users, connections)
    pub fn stats(&self) -> (usize, usize) {
        let users = self.connections.len();
        let total = self.connections.iter().map(|e| e.value().len()).sum();
        (users, total)
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

pub struct WsBroadcaster {
    manager: Arc<ConnectionManager>,
}

impl WsBroadcaster {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }
}

impl BroadcastPort for WsBroadcaster {
    fn publish(&self, event: DomainEvent) {
        tracing::debug!(
            case_id = %event.case_id,
            kind = ?event.kind,
            recipients = event.recipients.len(),
            "Broadcasting event"
        );
        let mut recipients = event.recipients.clone();
        recipients.sort();
        recipients.dedup();
        let message = WsMessage::Event(event);
        for user in recipients {
            self.manager.send_to_user(user, &message);
        }
    }
}
