//! Tests for the fan-out dispatcher: outcome classification, pruning,
//! aggregate status and the one-history-row invariant.

mod common;

use common::{insert_subscription, setup};
use rust_push_gateway::dispatch::{self, DeliveryStatus, NotificationPayload};
use rust_push_gateway::entity::{notification, subscription};
use sea_orm::EntityTrait;

fn payload(title: &str, body: &str) -> NotificationPayload {
    NotificationPayload {
        title: title.to_string(),
        body: body.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn all_healthy_subscribers_receive_the_payload() {
    let ctx = setup().await;
    let subs = vec![
        insert_subscription(&ctx.resources, "https://push.example.org/a", None).await,
        insert_subscription(&ctx.resources, "https://push.example.org/b", None).await,
    ];

    let outcome = dispatch::dispatch(&ctx.resources, &payload("Deploy", "v2"), &subs).await;

    assert_eq!(outcome.total, 2);
    assert_eq!(outcome.delivered, 2);
    assert_eq!(outcome.pruned, 0);
    assert_eq!(outcome.status, DeliveryStatus::Sent);
    assert_eq!(ctx.push.attempts_for("https://push.example.org/a"), 1);
    assert_eq!(ctx.push.attempts_for("https://push.example.org/b"), 1);
}

#[tokio::test]
async fn exactly_one_history_row_per_invocation() {
    let ctx = setup().await;
    let subs = vec![
        insert_subscription(&ctx.resources, "https://push.example.org/a", None).await,
        insert_subscription(&ctx.resources, "https://push.example.org/b", None).await,
        insert_subscription(&ctx.resources, "https://push.example.org/c", None).await,
    ];

    dispatch::dispatch(&ctx.resources, &payload("Deploy", "v2"), &subs).await;

    let rows = notification::Entity::find()
        .all(ctx.resources.db.as_ref())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, "sent");
    assert_eq!(rows[0].title, "Deploy");
}

#[tokio::test]
async fn empty_subscriber_set_records_failed() {
    let ctx = setup().await;

    let outcome = dispatch::dispatch(&ctx.resources, &payload("Deploy", "v2"), &[]).await;

    assert_eq!(outcome.total, 0);
    assert_eq!(outcome.delivered, 0);
    assert_eq!(outcome.status, DeliveryStatus::Failed);

    let rows = notification::Entity::find()
        .all(ctx.resources.db.as_ref())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, "failed");
}

#[tokio::test]
async fn expired_endpoint_is_pruned_while_others_deliver() {
    let ctx = setup().await;
    let healthy = insert_subscription(&ctx.resources, "https://push.example.org/ok", None).await;
    let expired = insert_subscription(&ctx.resources, "https://push.example.org/gone", None).await;
    ctx.push.respond_with("https://push.example.org/gone", 410);

    let outcome = dispatch::dispatch(
        &ctx.resources,
        &payload("Deploy", "v2"),
        &[healthy.clone(), expired.clone()],
    )
    .await;

    assert_eq!(outcome.delivered, 1);
    assert_eq!(outcome.pruned, 1);
    assert_eq!(outcome.status, DeliveryStatus::Sent);

    let remaining = subscription::Entity::find()
        .all(ctx.resources.db.as_ref())
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, healthy.id);
}

#[tokio::test]
async fn transient_failure_keeps_the_subscription() {
    let ctx = setup().await;
    let flaky = insert_subscription(&ctx.resources, "https://push.example.org/flaky", None).await;
    ctx.push.respond_with("https://push.example.org/flaky", 500);

    let outcome = dispatch::dispatch(&ctx.resources, &payload("Deploy", "v2"), &[flaky]).await;

    assert_eq!(outcome.delivered, 0);
    assert_eq!(outcome.pruned, 0);
    assert_eq!(outcome.status, DeliveryStatus::Failed);

    let remaining = subscription::Entity::find()
        .all(ctx.resources.db.as_ref())
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
}

#[tokio::test]
async fn one_failure_never_aborts_the_rest() {
    let ctx = setup().await;
    let subs = vec![
        insert_subscription(&ctx.resources, "https://push.example.org/1", None).await,
        insert_subscription(&ctx.resources, "https://push.example.org/2", None).await,
        insert_subscription(&ctx.resources, "https://push.example.org/3", None).await,
    ];
    ctx.push.respond_with("https://push.example.org/2", 502);

    let outcome = dispatch::dispatch(&ctx.resources, &payload("Deploy", "v2"), &subs).await;

    assert_eq!(outcome.total, 3);
    assert_eq!(outcome.delivered, 2);
    assert_eq!(ctx.push.total_attempts(), 3);
}

#[tokio::test]
async fn identical_payload_fans_out_again() {
    let ctx = setup().await;
    let subs =
        vec![insert_subscription(&ctx.resources, "https://push.example.org/a", None).await];

    dispatch::dispatch(&ctx.resources, &payload("Deploy", "v2"), &subs).await;
    dispatch::dispatch(&ctx.resources, &payload("Deploy", "v2"), &subs).await;

    assert_eq!(ctx.push.attempts_for("https://push.example.org/a"), 2);
    let rows = notification::Entity::find()
        .all(ctx.resources.db.as_ref())
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn delivered_subscription_gets_last_used_touched() {
    let ctx = setup().await;
    let sub = insert_subscription(&ctx.resources, "https://push.example.org/a", None).await;
    assert!(sub.last_used_at.is_none());

    dispatch::dispatch(&ctx.resources, &payload("Deploy", "v2"), &[sub.clone()]).await;

    let refreshed = subscription::Entity::find_by_id(sub.id)
        .one(ctx.resources.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert!(refreshed.last_used_at.is_some());
}

#[tokio::test]
async fn channel_scoped_recipients_exclude_other_channels() {
    let ctx = setup().await;
    insert_subscription(&ctx.resources, "https://push.example.org/unscoped", None).await;
    insert_subscription(&ctx.resources, "https://push.example.org/ch1", Some(1)).await;
    insert_subscription(&ctx.resources, "https://push.example.org/ch2", Some(2)).await;

    let channel_one = dispatch::load_recipients(&ctx.resources, Some(1))
        .await
        .unwrap();
    let endpoints: Vec<&str> = channel_one.iter().map(|s| s.endpoint.as_str()).collect();
    assert_eq!(
        endpoints,
        vec![
            "https://push.example.org/unscoped",
            "https://push.example.org/ch1"
        ]
    );

    let unscoped = dispatch::load_recipients(&ctx.resources, None).await.unwrap();
    assert_eq!(unscoped.len(), 3);
}
