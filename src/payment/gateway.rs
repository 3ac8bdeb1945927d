//! Payment gateway port.
//!
//! Order creation is network I/O and is never called while a store
//! transaction is open.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::signature;
use crate::error::CoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderRequest {
    /// Minor currency units
    #[serde(rename = "amount")]
    pub amount_minor: i64,
    pub currency: String,
    /// Idempotent receipt id, `rcpt_<caseId>_<attempt>`
    pub receipt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
}

/// Credentials shared with the gateway.
#[derive(Debug, Clone, Default)]
pub struct GatewaySecrets {
    pub key_id: String,
    /// Signs checkout confirmations
    pub key_secret: String,
    /// Signs webhook bodies
    pub webhook_secret: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Gateway name for logging
    fn name(&self) -> &'static str;

    async fn create_order(&self, request: &OrderRequest) -> Result<GatewayOrder, CoreError>;

    fn verify_payment_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool;

    fn verify_webhook_signature(&self, raw_body: &[u8], signature_header: &str) -> bool;
}

// ============================================================================
// HTTP gateway
// ============================================================================

/// REST gateway: `POST {base_url}/v1/orders` with basic auth.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    secrets: GatewaySecrets,
}

impl HttpPaymentGateway {
    pub fn new(base_url: impl Into<String>, secrets: GatewaySecrets) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| CoreError::Gateway(format!("HTTP client init failed: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secrets,
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<GatewayOrder, CoreError> {
        let url = format!("{}/v1/orders", self.base_url);
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.secrets.key_id, Some(&self.secrets.key_secret))
            .json(request)
            .send()
            .await
            .map_err(|e| CoreError::Gateway(format!("Order request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                status = %status,
                receipt = %request.receipt,
                body = %body,
                "Gateway rejected order"
            );
            return Err(CoreError::Gateway(format!(
                "Gateway returned {} for receipt {}",
                status, request.receipt
            )));
        }

        response
            .json::<GatewayOrder>()
            .await
            .map_err(|e| CoreError::Gateway(format!("Malformed order response: {}", e)))
    }

    fn verify_payment_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        signature::verify_checkout(&self.secrets.key_secret, order_id, payment_id, signature)
    }

    fn verify_webhook_signature(&self, raw_body: &[u8], signature_header: &str) -> bool {
        signature::verify(&self.secrets.webhook_secret, raw_body, signature_header)
    }
}

// ============================================================================
// Mock gateway
// ============================================================================

#[cfg(any(test, feature = "mock-gateway"))]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::Barrier;

    /// In-process gateway that issues `order_<ulid>` ids and signs like the
    /// real one.
    pub struct MockGateway {
        secrets: GatewaySecrets,
        create_calls: AtomicUsize,
        fail_orders: AtomicBool,
        next_order_ids: Mutex<Vec<String>>,
        requests: Mutex<Vec<OrderRequest>>,
        order_gate: Mutex<Option<Arc<Barrier>>>,
    }

    impl MockGateway {
        pub fn new(secrets: GatewaySecrets) -> Self {
            Self {
                secrets,
                create_calls: AtomicUsize::new(0),
                fail_orders: AtomicBool::new(false),
                next_order_ids: Mutex::new(Vec::new()),
                requests: Mutex::new(Vec::new()),
                order_gate: Mutex::new(None),
            }
        }

        pub fn with_test_secrets() -> Self {
            Self::new(GatewaySecrets {
                key_id: "rzp_test_key".into(),
                key_secret: "test_key_secret".into(),
                webhook_secret: "test_webhook_secret".into(),
            })
        }

        pub fn create_calls(&self) -> usize {
            self.create_calls.load(Ordering::SeqCst)
        }

        pub fn set_fail_orders(&self, fail: bool) {
            self.fail_orders.store(fail, Ordering::SeqCst);
        }

        /// Queue the id returned by the next `create_order`.
        pub fn push_order_id(&self, id: impl Into<String>) {
            if let Ok(mut ids) = self.next_order_ids.lock() {
                ids.insert(0, id.into());
            }
        }

        /// Make `create_order` calls wait until `parties` of them are in
        /// flight together.
        pub fn hold_orders(&self, parties: usize) {
            if let Ok(mut gate) = self.order_gate.lock() {
                *gate = Some(Arc::new(Barrier::new(parties)));
            }
        }

        pub fn requests(&self) -> Vec<OrderRequest> {
            self.requests.lock().map(|r| r.clone()).unwrap_or_default()
        }

        pub fn sign_checkout(&self, order_id: &str, payment_id: &str) -> Result<String, CoreError> {
            signature::sign_checkout(&self.secrets.key_secret, order_id, payment_id)
        }

        pub fn sign_webhook(&self, raw_body: &[u8]) -> Result<String, CoreError> {
            signature::sign(&self.secrets.webhook_secret, raw_body)
        }
    }

    #[async_trait]
    impl PaymentGateway for MockGateway {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn create_order(&self, request: &OrderRequest) -> Result<GatewayOrder, CoreError> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(request.clone());
            }
            let gate = self.order_gate.lock().ok().and_then(|g| g.clone());
            if let Some(gate) = gate {
                gate.wait().await;
            }
            if self.fail_orders.load(Ordering::SeqCst) {
                return Err(CoreError::Gateway("mock gateway unavailable".into()));
            }
            let queued = self.next_order_ids.lock().ok().and_then(|mut ids| ids.pop());
            let id = queued.unwrap_or_else(|| format!("order_{}", ulid::Ulid::new()));
            Ok(GatewayOrder { id })
        }

        fn verify_payment_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
            signature::verify_checkout(&self.secrets.key_secret, order_id, payment_id, signature)
        }

        fn verify_webhook_signature(&self, raw_body: &[u8], signature_header: &str) -> bool {
            signature::verify(&self.secrets.webhook_secret, raw_body, signature_header)
        }
    }

}
