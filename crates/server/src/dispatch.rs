//! The fan-out dispatcher: one inbound notification request becomes N
//! concurrent outbound push deliveries, with outcome classification, expired
//! subscription pruning and a single history row per invocation.

use futures::future::join_all;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::AppResources;
use crate::entity::{notification, subscription};
use crate::push::{DeliveryOutcome, PushTarget};

/// An action button attached to a notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PushAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// A fully resolved notification payload, ready for fan-out. Template
/// rendering and override precedence have already been applied by the
/// caller; title and body are non-empty and length-bounded.
#[derive(Clone, Debug, Default)]
pub struct NotificationPayload {
    pub channel_id: Option<i32>,
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
    pub image: Option<String>,
    pub badge: Option<String>,
    pub url: Option<String>,
    pub actions: Option<Vec<PushAction>>,
    pub require_interaction: Option<bool>,
}

/// Aggregate delivery status of one fan-out invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
        }
    }
}

/// Counts returned by [`dispatch`].
#[derive(Clone, Copy, Debug)]
pub struct DispatchOutcome {
    pub total: usize,
    pub delivered: usize,
    pub pruned: usize,
    pub status: DeliveryStatus,
}

/// The JSON document handed to the push delivery collaborator.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WirePayload<'a> {
    title: &'a str,
    body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    badge: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    actions: Option<&'a [PushAction]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    require_interaction: Option<bool>,
}

impl NotificationPayload {
    fn to_wire_json(&self) -> String {
        let wire = WirePayload {
            title: &self.title,
            body: &self.body,
            icon: self.icon.as_deref(),
            image: self.image.as_deref(),
            badge: self.badge.as_deref(),
            url: self.url.as_deref(),
            actions: self.actions.as_deref(),
            require_interaction: self.require_interaction,
        };
        serde_json::to_string(&wire).unwrap_or_else(|_| {
            serde_json::json!({ "title": self.title, "body": self.body }).to_string()
        })
    }

    pub fn actions_json(&self) -> Option<String> {
        self.actions
            .as_ref()
            .and_then(|actions| serde_json::to_string(actions).ok())
    }
}

/// Load the active subscriptions a payload fans out to.
///
/// A channel-scoped payload reaches that channel's subscriptions plus
/// unscoped ones; an unscoped payload reaches every active subscription.
/// Served through the subscriptions cache namespace.
pub async fn load_recipients(
    resources: &AppResources,
    channel_id: Option<i32>,
) -> Result<Vec<subscription::Model>, sea_orm::DbErr> {
    let key = match channel_id {
        Some(id) => format!("channel:{id}"),
        None => "all".to_string(),
    };
    let db = resources.db.clone();
    resources
        .caches
        .subscriptions
        .get_or_try_insert_with(key, || async move {
            let mut query = subscription::Entity::find()
                .filter(subscription::Column::IsActive.eq(true));
            if let Some(id) = channel_id {
                query = query.filter(
                    Condition::any()
                        .add(subscription::Column::ChannelId.eq(id))
                        .add(subscription::Column::ChannelId.is_null()),
                );
            }
            query
                .order_by_asc(subscription::Column::Id)
                .all(db.as_ref())
                .await
        })
        .await
}

/// Fan one payload out to every subscriber concurrently.
///
/// All outcomes are collected before returning; one subscriber's failure
/// never aborts delivery to the others. Endpoints reported permanently gone
/// are pruned. Exactly one history row is written per invocation regardless
/// of subscriber count; both the history write and the pruning are
/// best-effort and never fail the dispatch. There is no payload-level
/// deduplication: dispatching the same payload twice fans out twice.
pub async fn dispatch(
    resources: &AppResources,
    payload: &NotificationPayload,
    subscribers: &[subscription::Model],
) -> DispatchOutcome {
    let wire = payload.to_wire_json();

    let attempts = subscribers.iter().map(|sub| {
        let push = resources.push.clone();
        let target = PushTarget::from(sub);
        let wire = wire.clone();
        async move { (sub, push.deliver(&target, &wire).await) }
    });
    let results = join_all(attempts).await;

    let mut delivered = 0usize;
    let mut pruned = 0usize;
    for (sub, outcome) in results {
        match outcome {
            DeliveryOutcome::Delivered => {
                delivered += 1;
                touch_last_used(resources, sub).await;
            }
            DeliveryOutcome::Gone => {
                if prune_subscription(resources, sub).await {
                    pruned += 1;
                }
            }
            DeliveryOutcome::Failed(reason) => {
                tracing::warn!(
                    name = "dispatch.delivery_failed",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    endpoint = %sub.endpoint,
                    error = %reason,
                    message = "Push delivery failed"
                );
            }
        }
    }

    let status = if delivered > 0 {
        DeliveryStatus::Sent
    } else {
        DeliveryStatus::Failed
    };

    record_history(resources, payload, status).await;

    DispatchOutcome {
        total: subscribers.len(),
        delivered,
        pruned,
        status,
    }
}

/// Delete a subscription the push service reported permanently gone.
/// Best-effort: a deletion failure is logged and the outcome classification
/// stands.
async fn prune_subscription(resources: &AppResources, sub: &subscription::Model) -> bool {
    match subscription::Entity::delete_by_id(sub.id)
        .exec(resources.db.as_ref())
        .await
    {
        Ok(_) => {
            tracing::info!(
                name = "dispatch.subscription_pruned",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                endpoint = %sub.endpoint,
                message = "Removed expired push subscription"
            );
            resources.caches.subscriptions.clear();
            true
        }
        Err(e) => {
            tracing::error!(
                name = "dispatch.subscription_prune_failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                endpoint = %sub.endpoint,
                error = %e,
                message = "Failed to delete expired subscription"
            );
            false
        }
    }
}

/// Update `last_used_at` after a successful delivery, best-effort.
async fn touch_last_used(resources: &AppResources, sub: &subscription::Model) {
    let update = subscription::ActiveModel {
        id: ActiveValue::Unchanged(sub.id),
        last_used_at: ActiveValue::Set(Some(OffsetDateTime::now_utc())),
        ..Default::default()
    };
    if let Err(e) = update.update(resources.db.as_ref()).await {
        tracing::warn!(
            name = "dispatch.touch_last_used_failed",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            endpoint = %sub.endpoint,
            error = %e,
            message = "Failed to update subscription last_used_at"
        );
    }
}

/// Write the single history row for this invocation, best-effort: delivery
/// already happened and must not be retried merely because logging failed.
async fn record_history(
    resources: &AppResources,
    payload: &NotificationPayload,
    status: DeliveryStatus,
) {
    let row = notification::ActiveModel {
        id: ActiveValue::NotSet,
        channel_id: ActiveValue::Set(payload.channel_id),
        title: ActiveValue::Set(payload.title.clone()),
        body: ActiveValue::Set(payload.body.clone()),
        icon: ActiveValue::Set(payload.icon.clone()),
        image: ActiveValue::Set(payload.image.clone()),
        badge: ActiveValue::Set(payload.badge.clone()),
        url: ActiveValue::Set(payload.url.clone()),
        actions: ActiveValue::Set(payload.actions_json()),
        require_interaction: ActiveValue::Set(payload.require_interaction),
        status: ActiveValue::Set(status.as_str().to_string()),
        sent_at: ActiveValue::Set(OffsetDateTime::now_utc()),
    };
    if let Err(e) = row.insert(resources.db.as_ref()).await {
        tracing::error!(
            name = "dispatch.history_insert_failed",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            error = %e,
            message = "Failed to record notification history"
        );
    } else {
        resources.caches.stats.clear();
    }
}
