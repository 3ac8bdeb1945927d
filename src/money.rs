//! Fee and commission arithmetic
//!
//! All amounts are `Decimal` in major currency units with at most two
//! fractional digits. The gateway is addressed in minor units (`i64`, ×100).
//!
//! ```
//! use casebid::money::FeeBreakdown;
//! use rust_decimal::Decimal;
//!
//! let fee = FeeBreakdown::from_fee(Decimal::new(100_005, 2)); // 1000.05
//! assert_eq!(fee.platform_commission, Decimal::new(10_001, 2)); // 100.005 -> 100.01
//! assert_eq!(fee.total_amount, Decimal::new(110_006, 2));
//! ```

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Platform commission, percent of the provider fee.
pub const COMMISSION_PERCENT: u32 = 10;

/// Fractional digits carried by every stored amount.
pub const MONEY_SCALE: u32 = 2;

/// Largest accepted provider fee (keeps minor units well inside i64).
pub const MAX_FEE: i64 = 1_000_000_000;

/// Validate a provider fee coming from a client.
pub fn validate_fee(fee: Decimal) -> Result<Decimal, CoreError> {
    if fee <= Decimal::ZERO {
        return Err(CoreError::validation("Fee must be greater than zero"));
    }
    if fee.normalize().scale() > MONEY_SCALE {
        return Err(CoreError::validation(format!(
            "Fee precision exceeds {} decimal places",
            MONEY_SCALE
        )));
    }
    if fee > Decimal::from(MAX_FEE) {
        return Err(CoreError::validation("Fee is too large"));
    }
    Ok(fee.round_dp(MONEY_SCALE))
}

/// `round(fee × 0.10, 2)`, midpoint away from zero.
pub fn commission_for(fee: Decimal) -> Decimal {
    (fee * Decimal::from(COMMISSION_PERCENT) / Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Fee split persisted on every payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub provider_fee: Decimal,
    pub platform_commission: Decimal,
    pub total_amount: Decimal,
}

impl FeeBreakdown {
    pub fn from_fee(provider_fee: Decimal) -> Self {
        let provider_fee = provider_fee.round_dp(MONEY_SCALE);
        let platform_commission = commission_for(provider_fee);
        Self {
            provider_fee,
            platform_commission,
            total_amount: provider_fee + platform_commission,
        }
    }

    /// Total in minor currency units (paise/cents) for the gateway.
    pub fn total_minor_units(&self) -> Result<i64, CoreError> {
        to_minor_units(self.total_amount)
    }
}

pub fn to_minor_units(amount: Decimal) -> Result<i64, CoreError> {
    let scaled = amount * Decimal::ONE_HUNDRED;
    if scaled.fract() != Decimal::ZERO {
        return Err(CoreError::validation(format!(
            "Amount {} has sub-minor-unit precision",
            amount
        )));
    }
    scaled
        .to_i64()
        .ok_or_else(|| CoreError::validation(format!("Amount {} overflows", amount)))
}
