//! casebid server
//!
//! ```text
//! ┌──────────┐    ┌──────────────┐    ┌──────────────┐    ┌─────────┐
//! │   HTTP   │───▶│ Orchestrator │───▶│ Offer/Payment│───▶│  Store  │
//! │  (axum)  │    │   + AuthZ    │    │   engines    │    │ (PG/mem)│
//! └──────────┘    └──────────────┘    └──────────────┘    └─────────┘
//!       ▲                                    │
//!       └──────── WebSocket push ◀── Broadcast
//! ```
//!
//! Usage: `casebid [--env dev] [--port 8080]`

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use casebid::api::{self, AppState, JwtAuth};
use casebid::case::CaseOrchestrator;
use casebid::config::{AppConfig, GatewayKind};
use casebid::logging::init_logging;
use casebid::offer::{ExpiryWorker, OfferPolicy, WorkerConfig};
use casebid::payment::{HttpPaymentGateway, PaymentGateway};
use casebid::ports::{
    ConnectionManager, InMemoryDirectory, LogNotifier, Ports, UserDirectory, WsBroadcaster,
};
use casebid::rate_limit::RateLimiter;
use casebid::store::{MemoryStore, PgStore, Store};

// ============================================================
// ARGUMENTS
// ============================================================

fn arg_value(flags: &[&str]) -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    args.windows(2)
        .find(|pair| flags.contains(&pair[0].as_str()))
        .map(|pair| pair[1].clone())
}

fn get_env() -> String {
    arg_value(&["--env", "-e"]).unwrap_or_else(|| "dev".to_string())
}

fn get_port_override() -> Option<u16> {
    arg_value(&["--port"]).and_then(|p| p.parse().ok())
}

// ============================================================
// WIRING
// ============================================================

async fn build_store(config: &AppConfig) -> Result<Arc<dyn Store>> {
    match &config.postgres_url {
        Some(url) => {
            let store = PgStore::connect(url)
                .await
                .context("Failed to connect to PostgreSQL")?;
            store.migrate().await.context("Schema migration failed")?;
            tracing::info!("Using PostgreSQL store");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("postgres_url not set, using in-memory store (data is lost on exit)");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

fn build_gateway(config: &AppConfig) -> Result<Arc<dyn PaymentGateway>> {
    let payment = &config.payment;
    match payment.provider {
        GatewayKind::Http => {
            let gateway = HttpPaymentGateway::new(&payment.base_url, payment.secrets())
                .context("Failed to build payment gateway client")?;
            Ok(Arc::new(gateway))
        }
        #[cfg(feature = "mock-gateway")]
        GatewayKind::Mock => {
            tracing::warn!("Using in-process mock payment gateway");
            Ok(Arc::new(casebid::payment::MockGateway::new(payment.secrets())))
        }
        #[cfg(not(feature = "mock-gateway"))]
        GatewayKind::Mock => anyhow::bail!("mock gateway requested but feature `mock-gateway` is disabled"),
    }
}

// ============================================================
// MAIN
// ============================================================

#[tokio::main]
async fn main() -> Result<()> {
    let env = get_env();
    let mut config = AppConfig::load(&env)?;
    if let Some(port) = get_port_override() {
        config.http.port = port;
    }
    let _guard = init_logging(&config);
    tracing::info!(env = %env, version = env!("CARGO_PKG_VERSION"), "Starting casebid");

    let store = build_store(&config).await?;
    let gateway = build_gateway(&config)?;

    let directory = Arc::new(InMemoryDirectory::with_users(config.users.clone()));
    tracing::info!(users = directory.len(), "User directory seeded");
    let directory: Arc<dyn UserDirectory> = directory;

    let ws_manager = Arc::new(ConnectionManager::new());
    let ports = Ports {
        directory: directory.clone(),
        notifier: Arc::new(LogNotifier),
        broadcast: Arc::new(WsBroadcaster::new(ws_manager.clone())),
    };

    let policy = OfferPolicy {
        max_active_per_case: config.offers.max_active_per_case,
        ttl: chrono::Duration::hours(config.offers.ttl_hours),
    };
    let orchestrator = Arc::new(CaseOrchestrator::assemble(
        store,
        ports,
        gateway,
        &config.payment.currency,
        policy,
    ));

    // Offer expiry sweep
    let worker = ExpiryWorker::new(
        orchestrator.offers().clone(),
        WorkerConfig {
            scan_interval: Duration::from_secs(config.offers.sweep_interval_secs.max(1)),
        },
    );
    tokio::spawn(async move {
        worker.run().await;
    });

    // Idle rate-limit buckets
    let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
    let sweeper = limiter.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweeper.idle_ttl().max(Duration::from_secs(1)));
        loop {
            ticker.tick().await;
            let evicted = sweeper.sweep_idle();
            if evicted > 0 {
                tracing::debug!(evicted, remaining = sweeper.len(), "Rate-limit buckets swept");
            }
        }
    });

    let state = Arc::new(AppState {
        orchestrator,
        directory,
        ws_manager,
        limiter,
        jwt: Arc::new(JwtAuth::new(config.auth.jwt_secret.clone())),
        webhook_header: config.payment.signature_header.to_lowercase(),
    });

    api::run_server(&config.http.host, config.http.port, state)
        .await
        .context("HTTP server failed")
}
