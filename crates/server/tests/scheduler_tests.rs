//! Tests for the scheduler sweep and the repeat state machine.

mod common;

use common::{insert_subscription, setup};
use rust_push_gateway::entity::{notification, scheduled_notification};
use rust_push_gateway::scheduler;
use sea_orm::{ActiveModelTrait, ActiveValue, EntityTrait};
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

async fn insert_scheduled(
    resources: &rust_push_gateway::AppResources,
    scheduled_at: OffsetDateTime,
    repeat: &str,
    status: &str,
) -> scheduled_notification::Model {
    scheduled_notification::ActiveModel {
        id: ActiveValue::NotSet,
        channel_id: ActiveValue::Set(None),
        title: ActiveValue::Set("Standup".to_string()),
        body: ActiveValue::Set("Time for standup".to_string()),
        icon: ActiveValue::Set(None),
        image: ActiveValue::Set(None),
        badge: ActiveValue::Set(None),
        url: ActiveValue::Set(None),
        actions: ActiveValue::Set(None),
        require_interaction: ActiveValue::Set(None),
        scheduled_at: ActiveValue::Set(scheduled_at),
        timezone: ActiveValue::Set("Europe/Istanbul".to_string()),
        repeat: ActiveValue::Set(repeat.to_string()),
        status: ActiveValue::Set(status.to_string()),
        created_at: ActiveValue::Set(OffsetDateTime::now_utc()),
    }
    .insert(resources.db.as_ref())
    .await
    .expect("insert scheduled notification")
}

#[tokio::test]
async fn due_one_shot_row_fires_and_becomes_sent() {
    let ctx = setup().await;
    insert_subscription(&ctx.resources, "https://push.example.org/a", None).await;
    let row = insert_scheduled(
        &ctx.resources,
        OffsetDateTime::now_utc() - Duration::minutes(5),
        "none",
        "pending",
    )
    .await;

    let processed = scheduler::process_due(&ctx.resources).await.unwrap();
    assert_eq!(processed, 1);

    let refreshed = scheduled_notification::Entity::find_by_id(row.id)
        .one(ctx.resources.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(refreshed.status, "sent");

    // The fan-out left exactly one history row.
    let history = notification::Entity::find()
        .all(ctx.resources.db.as_ref())
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].title, "Standup");
    assert_eq!(ctx.push.attempts_for("https://push.example.org/a"), 1);
}

#[tokio::test]
async fn daily_repeat_advances_from_prior_value_not_sweep_time() {
    let ctx = setup().await;
    // Overdue by two days: the next fire time still derives from the
    // original schedule, not from "now".
    let row = insert_scheduled(
        &ctx.resources,
        datetime!(2024-01-01 00:00 UTC),
        "daily",
        "pending",
    )
    .await;

    let processed = scheduler::process_due(&ctx.resources).await.unwrap();
    assert_eq!(processed, 1);

    let refreshed = scheduled_notification::Entity::find_by_id(row.id)
        .one(ctx.resources.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(refreshed.status, "pending");
    assert_eq!(refreshed.scheduled_at, datetime!(2024-01-02 00:00 UTC));
}

#[tokio::test]
async fn future_and_terminal_rows_are_not_swept() {
    let ctx = setup().await;
    let future = insert_scheduled(
        &ctx.resources,
        OffsetDateTime::now_utc() + Duration::hours(1),
        "none",
        "pending",
    )
    .await;
    let cancelled = insert_scheduled(
        &ctx.resources,
        OffsetDateTime::now_utc() - Duration::hours(1),
        "none",
        "cancelled",
    )
    .await;
    let already_sent = insert_scheduled(
        &ctx.resources,
        OffsetDateTime::now_utc() - Duration::hours(1),
        "none",
        "sent",
    )
    .await;

    let processed = scheduler::process_due(&ctx.resources).await.unwrap();
    assert_eq!(processed, 0);

    for (id, expected) in [
        (future.id, "pending"),
        (cancelled.id, "cancelled"),
        (already_sent.id, "sent"),
    ] {
        let row = scheduled_notification::Entity::find_by_id(id)
            .one(ctx.resources.db.as_ref())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, expected);
    }

    assert_eq!(ctx.push.total_attempts(), 0);
}

#[tokio::test]
async fn repeating_row_is_reused_across_sweeps() {
    let ctx = setup().await;
    let row = insert_scheduled(
        &ctx.resources,
        OffsetDateTime::now_utc() - time::Duration::days(10),
        "weekly",
        "pending",
    )
    .await;

    // First sweep fires and advances by one week (still in the past here).
    scheduler::process_due(&ctx.resources).await.unwrap();
    let after_first = scheduled_notification::Entity::find_by_id(row.id)
        .one(ctx.resources.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after_first.status, "pending");
    assert_eq!(
        after_first.scheduled_at,
        row.scheduled_at + time::Duration::weeks(1)
    );

    // Second sweep fires again from the advanced fire time.
    let processed = scheduler::process_due(&ctx.resources).await.unwrap();
    assert_eq!(processed, 1);

    let history = notification::Entity::find()
        .all(ctx.resources.db.as_ref())
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn sweep_with_no_subscribers_records_failed_history() {
    let ctx = setup().await;
    insert_scheduled(
        &ctx.resources,
        OffsetDateTime::now_utc() - Duration::minutes(1),
        "none",
        "pending",
    )
    .await;

    scheduler::process_due(&ctx.resources).await.unwrap();

    let history = notification::Entity::find()
        .all(ctx.resources.db.as_ref())
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, "failed");
}
