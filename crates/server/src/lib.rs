//! A self-hosted webhook-to-push-notification gateway.
//!
//! External services call an authenticated HTTP endpoint and the gateway fans
//! the message out as a Web Push notification to every browser subscriber,
//! optionally scoped to a named channel and optionally expanded from a
//! variable-templated message.

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::cache::GatewayCaches;
use crate::config::AppConfig;
use crate::push::PushClient;
use crate::security::log::SecurityLog;
use crate::security::rate_limit::FixedWindowLimiter;

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod entity;
pub mod error;
pub mod push;
pub mod scheduler;
pub mod security;
pub mod stats;
pub mod templates;

/// Process-wide services, created once at startup and injected into every
/// request handler. The caches, the rate limiter and the security log ring
/// live for the process lifetime with no explicit teardown.
#[derive(Clone)]
pub struct AppResources {
    pub db: Arc<DatabaseConnection>,
    pub push: Arc<dyn PushClient>,
    pub config: Arc<AppConfig>,
    pub caches: GatewayCaches,
    pub limiter: Arc<FixedWindowLimiter>,
    pub security_log: Arc<SecurityLog>,
}
