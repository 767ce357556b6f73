//! Scheduled notification sweep and the repeat state machine.
//!
//! State machine per row: `pending --(fires, repeat=none)--> sent`;
//! `pending --(fires, repeat!=none)--> pending` with `scheduled_at` advanced;
//! `pending --(explicit cancel)--> cancelled`. `sent` and `cancelled` are
//! terminal. The sweep is triggered externally (the cron endpoint); the
//! process spins no timer loop for it.

use sea_orm::{ActiveModelTrait, ActiveValue, ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use std::str::FromStr;
use time::{Date, Month, OffsetDateTime};

use crate::AppResources;
use crate::dispatch::{self, NotificationPayload, PushAction};
use crate::entity::scheduled_notification;

/// Repeat policy of a scheduled notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepeatPolicy {
    None,
    Daily,
    Weekly,
    Monthly,
}

impl RepeatPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatPolicy::None => "none",
            RepeatPolicy::Daily => "daily",
            RepeatPolicy::Weekly => "weekly",
            RepeatPolicy::Monthly => "monthly",
        }
    }
}

impl FromStr for RepeatPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(RepeatPolicy::None),
            "daily" => Ok(RepeatPolicy::Daily),
            "weekly" => Ok(RepeatPolicy::Weekly),
            "monthly" => Ok(RepeatPolicy::Monthly),
            other => Err(format!("unknown repeat policy '{other}'")),
        }
    }
}

/// Advance a fire time by one repeat interval, from its previous value (not
/// from "now"), so a missed sweep still advances deterministically instead
/// of drifting to the sweep time. Month arithmetic clamps the day to the
/// target month's length.
pub fn advance_schedule(at: OffsetDateTime, repeat: RepeatPolicy) -> OffsetDateTime {
    match repeat {
        RepeatPolicy::None => at,
        RepeatPolicy::Daily => at + time::Duration::days(1),
        RepeatPolicy::Weekly => at + time::Duration::weeks(1),
        RepeatPolicy::Monthly => add_one_month(at),
    }
}

fn add_one_month(at: OffsetDateTime) -> OffsetDateTime {
    let date = at.date();
    let (year, month) = if date.month() == Month::December {
        (date.year() + 1, Month::January)
    } else {
        (date.year(), date.month().next())
    };
    let day = date
        .day()
        .min(time::util::days_in_year_month(year, month));
    match Date::from_calendar_date(year, month, day) {
        Ok(next) => at.replace_date(next),
        Err(_) => at,
    }
}

/// Run one sweep: fan out every due `pending` row and apply its transition.
/// Returns the number of rows processed.
pub async fn process_due(resources: &AppResources) -> Result<u64, sea_orm::DbErr> {
    let now = OffsetDateTime::now_utc();
    let due = scheduled_notification::Entity::find()
        .filter(scheduled_notification::Column::Status.eq("pending"))
        .filter(scheduled_notification::Column::ScheduledAt.lte(now))
        .order_by_asc(scheduled_notification::Column::ScheduledAt)
        .all(resources.db.as_ref())
        .await?;

    let mut processed = 0u64;
    for scheduled in due {
        let payload = payload_from_scheduled(&scheduled);
        let recipients = dispatch::load_recipients(resources, scheduled.channel_id).await?;
        let outcome = dispatch::dispatch(resources, &payload, &recipients).await;

        tracing::info!(
            name = "scheduler.fired",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            scheduled_id = scheduled.id,
            delivered = outcome.delivered,
            total = outcome.total,
            message = "Scheduled notification fired"
        );

        let repeat = RepeatPolicy::from_str(&scheduled.repeat).unwrap_or(RepeatPolicy::None);
        let mut active: scheduled_notification::ActiveModel = scheduled.clone().into();
        match repeat {
            RepeatPolicy::None => {
                active.status = ActiveValue::Set("sent".to_string());
            }
            _ => {
                active.scheduled_at =
                    ActiveValue::Set(advance_schedule(scheduled.scheduled_at, repeat));
            }
        }
        active.update(resources.db.as_ref()).await?;

        processed += 1;
    }

    Ok(processed)
}

fn payload_from_scheduled(scheduled: &scheduled_notification::Model) -> NotificationPayload {
    let actions = scheduled
        .actions
        .as_deref()
        .and_then(|json| serde_json::from_str::<Vec<PushAction>>(json).ok());
    NotificationPayload {
        channel_id: scheduled.channel_id,
        title: scheduled.title.clone(),
        body: scheduled.body.clone(),
        icon: scheduled.icon.clone(),
        image: scheduled.image.clone(),
        badge: scheduled.badge.clone(),
        url: scheduled.url.clone(),
        actions,
        require_interaction: scheduled.require_interaction,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn daily_advances_one_day_from_previous_value() {
        let at = datetime!(2024-01-01 00:00 UTC);
        assert_eq!(
            advance_schedule(at, RepeatPolicy::Daily),
            datetime!(2024-01-02 00:00 UTC)
        );
    }

    #[test]
    fn weekly_advances_seven_days() {
        let at = datetime!(2024-01-01 09:30 UTC);
        assert_eq!(
            advance_schedule(at, RepeatPolicy::Weekly),
            datetime!(2024-01-08 09:30 UTC)
        );
    }

    #[test]
    fn monthly_advances_one_calendar_month() {
        let at = datetime!(2024-03-15 12:00 UTC);
        assert_eq!(
            advance_schedule(at, RepeatPolicy::Monthly),
            datetime!(2024-04-15 12:00 UTC)
        );
    }

    #[test]
    fn monthly_clamps_to_target_month_length() {
        assert_eq!(
            advance_schedule(datetime!(2024-01-31 08:00 UTC), RepeatPolicy::Monthly),
            datetime!(2024-02-29 08:00 UTC)
        );
        assert_eq!(
            advance_schedule(datetime!(2023-01-31 08:00 UTC), RepeatPolicy::Monthly),
            datetime!(2023-02-28 08:00 UTC)
        );
    }

    #[test]
    fn monthly_wraps_december_into_next_year() {
        assert_eq!(
            advance_schedule(datetime!(2024-12-10 00:00 UTC), RepeatPolicy::Monthly),
            datetime!(2025-01-10 00:00 UTC)
        );
    }

    #[test]
    fn none_leaves_fire_time_unchanged() {
        let at = datetime!(2024-01-01 00:00 UTC);
        assert_eq!(advance_schedule(at, RepeatPolicy::None), at);
    }

    #[test]
    fn repeat_policy_round_trips() {
        for policy in [
            RepeatPolicy::None,
            RepeatPolicy::Daily,
            RepeatPolicy::Weekly,
            RepeatPolicy::Monthly,
        ] {
            assert_eq!(RepeatPolicy::from_str(policy.as_str()).unwrap(), policy);
        }
        assert!(RepeatPolicy::from_str("hourly").is_err());
    }
}
