//! HMAC-SHA256 signatures used by the gateway.
//!
//! Checkout signature: `hex(HMAC(key_secret, "{order_id}|{payment_id}"))`.
//! Webhook signature: `hex(HMAC(webhook_secret, raw_body))`. The two use
//! different secrets. Comparison is constant time.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::CoreError;

type HmacSha256 = Hmac<Sha256>;

fn mac(secret: &str, payload: &[u8]) -> Result<HmacSha256, CoreError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| CoreError::validation(format!("Invalid signing secret: {}", e)))?;
    mac.update(payload);
    Ok(mac)
}

fn checkout_payload(order_id: &str, payment_id: &str) -> String {
    format!("{}|{}", order_id, payment_id)
}

pub fn sign(secret: &str, payload: &[u8]) -> Result<String, CoreError> {
    Ok(hex::encode(mac(secret, payload)?.finalize().into_bytes()))
}

pub fn verify(secret: &str, payload: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    match mac(secret, payload) {
        Ok(mac) => mac.verify_slice(&expected).is_ok(),
        Err(_) => false,
    }
}

pub fn sign_checkout(key_secret: &str, order_id: &str, payment_id: &str) -> Result<String, CoreError> {
    sign(key_secret, checkout_payload(order_id, payment_id).as_bytes())
}

pub fn verify_checkout(key_secret: &str, order_id: &str, payment_id: &str, signature: &str) -> bool {
    verify(key_secret, checkout_payload(order_id, payment_id).as_bytes(), signature)
}
