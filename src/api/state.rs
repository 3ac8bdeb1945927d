use std::sync::Arc;

use super::auth::JwtAuth;
use crate::case::CaseOrchestrator;
use crate::ports::{ConnectionManager, UserDirectory};
use crate::rate_limit::RateLimiter;

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<CaseOrchestrator>,
    /// Resolves token subjects into actors
    pub directory: Arc<dyn UserDirectory>,
    pub ws_manager: Arc<ConnectionManager>,
    pub limiter: Arc<RateLimiter>,
    pub jwt: Arc<JwtAuth>,
    /// Header carrying the gateway's webhook signature
    pub webhook_header: String,
}
