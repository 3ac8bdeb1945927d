//! Expiry Worker
//!
//! Periodic trigger for `OfferEngine::sweep_expired_offers`. Shares nothing
//! with request handlers except the store, so it runs alongside them.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info};

use super::engine::{OfferEngine, SweepReport};
use crate::error::CoreError;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often to sweep
    pub scan_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(60),
        }
    }
}

pub struct ExpiryWorker {
    engine: Arc<OfferEngine>,
    config: WorkerConfig,
}

impl ExpiryWorker {
    pub fn new(engine: Arc<OfferEngine>, config: WorkerConfig) -> Self {
        Self { engine, config }
    }

    pub fn with_defaults(engine: Arc<OfferEngine>) -> Self {
        Self::new(engine, WorkerConfig::default())
    }

    /// Sweep forever.
    pub async fn run(&self) -> ! {
        info!(
            scan_interval_secs = self.config.scan_interval.as_secs(),
            "Starting offer expiry worker"
        );

        let mut ticker = tokio::time::interval(self.config.scan_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.sweep_once().await {
                error!(error = %e, "Offer expiry sweep failed");
            }
        }
    }

    pub async fn sweep_once(&self) -> Result<SweepReport, CoreError> {
        let report = self.engine.sweep_expired_offers(Utc::now()).await?;
        if report.expired == 0 {
            debug!("No expired offers");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::CaseStatus;
    use crate::core_types::{Category, UserId};
    use crate::offer::{Offer, OfferPolicy, OfferStatus};
    use crate::store::Store;
    use crate::test_support::Harness;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_sweep_once_expires_past_offers_only() {
        let h = Harness::new();
        let case = h.seed_case(CaseStatus::UnderReview, Category::Tax).await;
        let past = Utc::now() - chrono::Duration::hours(72);

        let stale = Offer::new(case.id, UserId(10), Decimal::from(5), chrono::Duration::hours(48), past);
        let mut accepted =
            Offer::new(case.id, UserId(11), Decimal::from(5), chrono::Duration::hours(48), past);
        accepted.status = OfferStatus::Accepted;
        let fresh = Offer::new(
            case.id,
            UserId(12),
            Decimal::from(5),
            chrono::Duration::hours(48),
            Utc::now(),
        );
        h.seed_offers(&[stale.clone(), accepted.clone(), fresh.clone()]).await;

        let engine = Arc::new(OfferEngine::new(
            h.store.clone(),
            h.audit.clone(),
            h.ports.clone(),
            OfferPolicy::default(),
        ));
        let worker = ExpiryWorker::with_defaults(engine);
        let report = worker.sweep_once().await.unwrap();
        assert_eq!(report.expired, 1);

        let status = |id| {
            let store = h.store.clone();
            async move { store.offer(id).await.unwrap().unwrap().status }
        };
        assert_eq!(status(stale.id).await, OfferStatus::Expired);
        assert_eq!(status(accepted.id).await, OfferStatus::Accepted);
        assert_eq!(status(fresh.id).await, OfferStatus::Submitted);
    }
}
