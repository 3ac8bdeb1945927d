//! Offer Negotiation
//!
//! Providers bid on published cases; the owner accepts one bid, which
//! rejects the rest and moves the case to PAYMENT_PENDING. Stale bids are
//! expired by a periodic sweep.

pub mod engine;
pub mod state;
pub mod types;
pub mod worker;

pub use engine::{OfferEngine, OfferPolicy, SweepReport};
pub use state::OfferStatus;
pub use types::Offer;
pub use worker::{ExpiryWorker, WorkerConfig};
