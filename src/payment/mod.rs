//! Payment Settlement
//!
//! Gateway orders, checkout/webhook confirmation and post-capture
//! administration. Payments are keyed by the gateway order id.

pub mod adapter;
pub mod gateway;
pub mod signature;
pub mod state;
pub mod types;
pub mod webhook;

pub use adapter::{PaymentAdapter, WebhookOutcome};
#[cfg(any(test, feature = "mock-gateway"))]
pub use gateway::mock::MockGateway;
pub use gateway::{GatewayOrder, GatewaySecrets, HttpPaymentGateway, OrderRequest, PaymentGateway};
pub use state::PaymentStatus;
pub use types::Payment;
pub use webhook::WebhookEvent;
