//! casebid - case lifecycle, offer negotiation and payment settlement engine
//!
//! # Modules
//!
//! - [`core_types`] - Identifiers, roles, categories and the `Actor`
//! - [`error`] - `CoreError` taxonomy
//! - [`money`] - Fee and commission arithmetic
//! - [`case`] - Case state machine and the `CaseOrchestrator` entry point
//! - [`offer`] - Offer bidding, acceptance and expiry
//! - [`payment`] - Gateway orders, signature checks and webhooks
//! - [`authz`] - Role/ownership/state policy table
//! - [`audit`] - Best-effort audit trail
//! - [`ports`] - User directory, notifications and event broadcast
//! - [`store`] - Transactional storage (in-memory and PostgreSQL)
//! - [`rate_limit`] - Per-actor token buckets
//! - [`api`] - axum HTTP and WebSocket surface

// Core types - must be first!
pub mod core_types;
pub mod error;
pub mod money;

// Domain
pub mod audit;
pub mod authz;
pub mod case;
pub mod offer;
pub mod payment;

// Infrastructure
pub mod api;
pub mod config;
pub mod logging;
pub mod ports;
pub mod rate_limit;
pub mod store;

#[cfg(test)]
mod test_support;

// Convenient re-exports at crate root
pub use case::{Case, CaseOrchestrator, CaseStatus, NewCase};
pub use core_types::{Actor, CaseId, Category, OfferId, PaymentId, Role, UserId};
pub use error::CoreError;
pub use offer::{Offer, OfferStatus};
pub use payment::{Payment, PaymentStatus};
