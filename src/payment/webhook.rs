//! Gateway webhook payloads.
//!
//! ```json
//! {"event": "payment.captured",
//!  "payload": {"payment": {"entity": {"id": "pay_1", "order_id": "order_1"}}}}
//! ```

use serde::Deserialize;

use crate::error::CoreError;

pub const EVENT_CAPTURED: &str = "payment.captured";
pub const EVENT_FAILED: &str = "payment.failed";

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub event: String,
    #[serde(default)]
    pub payload: WebhookBody,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookBody {
    pub payment: Option<PaymentWrapper>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentWrapper {
    pub entity: PaymentEntity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEntity {
    pub id: String,
    pub order_id: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// A webhook reduced to what the adapter acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    Captured {
        order_id: String,
        payment_id: String,
    },
    Failed {
        order_id: String,
        payment_id: String,
        reason: Option<String>,
    },
    Unrecognized(String),
}

impl WebhookEvent {
    /// Parse a raw body. Call only after the signature has been verified.
    pub fn parse(raw_body: &[u8]) -> Result<Self, CoreError> {
        let payload: WebhookPayload = serde_json::from_slice(raw_body)
            .map_err(|e| CoreError::validation(format!("Malformed webhook body: {}", e)))?;

        let WebhookPayload { event, payload } = payload;
        let entity = || {
            payload
                .payment
                .clone()
                .map(|p| p.entity)
                .ok_or_else(|| CoreError::validation("Webhook has no payment entity"))
        };

        match event.as_str() {
            EVENT_CAPTURED => {
                let entity = entity()?;
                Ok(WebhookEvent::Captured {
                    order_id: entity.order_id,
                    payment_id: entity.id,
                })
            }
            EVENT_FAILED => {
                let entity = entity()?;
                Ok(WebhookEvent::Failed {
                    order_id: entity.order_id,
                    payment_id: entity.id,
                    reason: entity.error_description,
                })
            }
            _ => Ok(WebhookEvent::Unrecognized(event.clone())),
        }
    }
}
