//! Shared fixtures: an in-memory database with the gateway schema, a
//! scripted push collaborator and fully wired application resources.
#![allow(dead_code)]

use dashmap::DashMap;
use rust_push_gateway::AppResources;
use rust_push_gateway::cache::GatewayCaches;
use rust_push_gateway::config::{AppConfig, PushConfig, SecurityConfig};
use rust_push_gateway::entity::{
    channel, notification, notification_template, scheduled_notification, security_log,
    subscription,
};
use rust_push_gateway::push::{DeliveryOutcome, PushClient, PushTarget};
use rust_push_gateway::security::log::SecurityLog;
use rust_push_gateway::security::rate_limit::FixedWindowLimiter;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ConnectionTrait, Database, DatabaseConnection, Schema,
};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

pub const TEST_API_SECRET: &str = "test-global-secret-0123456789abcdef";

/// Push collaborator scripted by endpoint: unknown endpoints deliver, known
/// ones answer with the configured HTTP status.
#[derive(Default)]
pub struct ScriptedPush {
    statuses: DashMap<String, u16>,
    attempts: DashMap<String, u32>,
}

impl ScriptedPush {
    pub fn respond_with(&self, endpoint: &str, status: u16) {
        self.statuses.insert(endpoint.to_string(), status);
    }

    pub fn attempts_for(&self, endpoint: &str) -> u32 {
        self.attempts.get(endpoint).map(|v| *v).unwrap_or(0)
    }

    pub fn total_attempts(&self) -> u32 {
        self.attempts.iter().map(|e| *e.value()).sum()
    }
}

#[async_trait::async_trait]
impl PushClient for ScriptedPush {
    async fn deliver(&self, target: &PushTarget, _payload: &str) -> DeliveryOutcome {
        *self.attempts.entry(target.endpoint.clone()).or_insert(0) += 1;
        match self.statuses.get(&target.endpoint).map(|s| *s) {
            None => DeliveryOutcome::Delivered,
            Some(status) if (200..300).contains(&status) => DeliveryOutcome::Delivered,
            Some(404) | Some(410) => DeliveryOutcome::Gone,
            Some(status) => DeliveryOutcome::Failed(format!("push service returned HTTP {status}")),
        }
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_string(),
        api_secret: TEST_API_SECRET.to_string(),
        cron_secret: None,
        webhook_secret: None,
        push: PushConfig {
            vapid_public_key: String::new(),
            vapid_private_key: String::new(),
            vapid_subject: "mailto:ops@example.org".to_string(),
        },
        security: SecurityConfig::default(),
    }
}

pub struct TestContext {
    pub resources: AppResources,
    pub push: Arc<ScriptedPush>,
}

pub async fn setup() -> TestContext {
    setup_with(test_config()).await
}

pub async fn setup_with(config: AppConfig) -> TestContext {
    let db = Arc::new(fresh_database().await);
    let push = Arc::new(ScriptedPush::default());
    let limiter = Arc::new(FixedWindowLimiter::new(
        Duration::from_secs(config.security.rate_limit_window_secs),
        config.security.rate_limit_max_requests,
    ));
    let security_log = Arc::new(SecurityLog::new(db.clone()));

    let resources = AppResources {
        db,
        push: push.clone(),
        config: Arc::new(config),
        caches: GatewayCaches::default(),
        limiter,
        security_log,
    };

    TestContext { resources, push }
}

async fn fresh_database() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    db.execute(backend.build(&schema.create_table_from_entity(channel::Entity)))
        .await
        .unwrap();
    db.execute(backend.build(&schema.create_table_from_entity(subscription::Entity)))
        .await
        .unwrap();
    db.execute(backend.build(&schema.create_table_from_entity(notification::Entity)))
        .await
        .unwrap();
    db.execute(backend.build(&schema.create_table_from_entity(notification_template::Entity)))
        .await
        .unwrap();
    db.execute(backend.build(&schema.create_table_from_entity(scheduled_notification::Entity)))
        .await
        .unwrap();
    db.execute(backend.build(&schema.create_table_from_entity(security_log::Entity)))
        .await
        .unwrap();

    db
}

pub async fn insert_subscription(
    resources: &AppResources,
    endpoint: &str,
    channel_id: Option<i32>,
) -> subscription::Model {
    let now = OffsetDateTime::now_utc();
    subscription::ActiveModel {
        id: ActiveValue::NotSet,
        channel_id: ActiveValue::Set(channel_id),
        endpoint: ActiveValue::Set(endpoint.to_string()),
        p256dh: ActiveValue::Set("BNcRdreALRFXTkOOUHK1EtK2wtaz5Ry4YfYCA_0QTpQtUbVlUls0VJXg7A8u-Ts1XbjhazAkj7I99e8QcYP7DkM".to_string()),
        auth: ActiveValue::Set("tBHItJI5svbpez7KI4CCXg".to_string()),
        user_agent: ActiveValue::Set(None),
        is_active: ActiveValue::Set(true),
        last_used_at: ActiveValue::Set(None),
        created_at: ActiveValue::Set(now),
        updated_at: ActiveValue::Set(now),
    }
    .insert(resources.db.as_ref())
    .await
    .expect("insert subscription")
}

pub async fn insert_channel(resources: &AppResources, name: &str, api_key: &str) -> channel::Model {
    channel::ActiveModel {
        id: ActiveValue::NotSet,
        name: ActiveValue::Set(name.to_string()),
        slug: ActiveValue::Set(rust_push_gateway::templates::slugify(name)),
        api_key: ActiveValue::Set(api_key.to_string()),
        color: ActiveValue::Set("#3B82F6".to_string()),
        icon: ActiveValue::Set(Some("bell".to_string())),
        is_active: ActiveValue::Set(true),
        created_at: ActiveValue::Set(OffsetDateTime::now_utc()),
    }
    .insert(resources.db.as_ref())
    .await
    .expect("insert channel")
}
