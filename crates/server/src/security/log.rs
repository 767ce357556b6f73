//! Security event log: an in-memory ring of recent events for diagnostics,
//! mirrored into the `security_logs` table best-effort. A database failure
//! downgrades to a tracing warning and never reaches the caller.

use axum::extract::Request;
use sea_orm::{ActiveModelTrait, ActiveValue, DatabaseConnection};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::entity::security_log;

/// Keep the last 1000 entries in memory.
const MAX_RING_ENTRIES: usize = 1000;

/// One security-relevant event.
#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecurityEvent {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub ip: String,
    pub user_agent: String,
    pub method: String,
    pub path: String,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl SecurityEvent {
    pub fn new(ip: &str, user_agent: &str, method: &str, path: &str) -> Self {
        Self {
            timestamp: OffsetDateTime::now_utc(),
            ip: ip.to_string(),
            user_agent: user_agent.to_string(),
            method: method.to_string(),
            path: path.to_string(),
            event: String::new(),
            status: None,
            details: None,
        }
    }

    /// Capture ip/user-agent/method/path from an inbound request.
    pub fn from_request(request: &Request, ip: &str) -> Self {
        let user_agent = request
            .headers()
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown");
        Self::new(
            ip,
            user_agent,
            request.method().as_str(),
            request.uri().path(),
        )
    }

    pub fn with_event(mut self, event: &str) -> Self {
        self.event = event.to_string();
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Process-wide security log service, created once at startup.
pub struct SecurityLog {
    ring: Mutex<VecDeque<SecurityEvent>>,
    db: Arc<DatabaseConnection>,
}

impl SecurityLog {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            ring: Mutex::new(VecDeque::with_capacity(MAX_RING_ENTRIES)),
            db,
        }
    }

    /// Record an event: ring buffer, tracing, then the database mirror.
    pub async fn record(&self, event: SecurityEvent) {
        tracing::info!(
            name = "security.event",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            event = %event.event,
            ip = %event.ip,
            method = %event.method,
            path = %event.path,
            message = "Security event recorded"
        );

        if let Ok(mut ring) = self.ring.lock() {
            if ring.len() >= MAX_RING_ENTRIES {
                ring.pop_front();
            }
            ring.push_back(event.clone());
        }

        let row = security_log::ActiveModel {
            id: ActiveValue::NotSet,
            ip: ActiveValue::Set(event.ip),
            user_agent: ActiveValue::Set(event.user_agent),
            method: ActiveValue::Set(event.method),
            path: ActiveValue::Set(event.path),
            event: ActiveValue::Set(event.event),
            status: ActiveValue::Set(event.status.map(i32::from)),
            details: ActiveValue::Set(event.details.map(|d| d.to_string())),
            created_at: ActiveValue::Set(event.timestamp),
        };
        if let Err(e) = row.insert(self.db.as_ref()).await {
            tracing::warn!(
                name = "security.log.insert_failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                error = %e,
                message = "Failed to mirror security event to database"
            );
        }
    }

    /// The most recent `limit` events, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<SecurityEvent> {
        match self.ring.lock() {
            Ok(ring) => {
                let skip = ring.len().saturating_sub(limit);
                ring.iter().skip(skip).cloned().collect()
            }
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.ring.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
