use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Create the gateway schema: channels, subscriptions, notification history,
/// templates, scheduled notifications and the security log.
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Channels::Table)
                    .if_not_exists()
                    .col(pk_auto(Channels::Id))
                    .col(string_len(Channels::Name, 64))
                    .col(string_len_uniq(Channels::Slug, 64))
                    .col(string_len_uniq(Channels::ApiKey, 64))
                    .col(
                        ColumnDef::new(Channels::Color)
                            .string_len(7)
                            .not_null()
                            .default("#3B82F6"),
                    )
                    .col(
                        ColumnDef::new(Channels::Icon)
                            .string_len(32)
                            .default("bell"),
                    )
                    .col(boolean(Channels::IsActive).default(true))
                    .col(
                        timestamp_with_time_zone(Channels::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Subscriptions::Table)
                    .if_not_exists()
                    .col(pk_auto(Subscriptions::Id))
                    .col(integer_null(Subscriptions::ChannelId))
                    .col(string_len_uniq(Subscriptions::Endpoint, 512))
                    .col(string_len(Subscriptions::P256dh, 256))
                    .col(string_len(Subscriptions::Auth, 128))
                    .col(string_len_null(Subscriptions::UserAgent, 512))
                    .col(boolean(Subscriptions::IsActive).default(true))
                    .col(timestamp_with_time_zone_null(Subscriptions::LastUsedAt))
                    .col(
                        timestamp_with_time_zone(Subscriptions::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Subscriptions::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .index(
                        Index::create()
                            .name("idx_subscriptions_channel_id")
                            .col(Subscriptions::ChannelId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Notifications::Table)
                    .if_not_exists()
                    .col(pk_auto(Notifications::Id))
                    .col(integer_null(Notifications::ChannelId))
                    .col(string_len(Notifications::Title, 256))
                    .col(string_len(Notifications::Body, 1024))
                    .col(string_len_null(Notifications::Icon, 512))
                    .col(string_len_null(Notifications::Image, 512))
                    .col(string_len_null(Notifications::Badge, 512))
                    .col(string_len_null(Notifications::Url, 512))
                    .col(text_null(Notifications::Actions))
                    .col(boolean_null(Notifications::RequireInteraction))
                    .col(
                        ColumnDef::new(Notifications::Status)
                            .string_len(16)
                            .not_null()
                            .default("sent")
                            .comment("Aggregate fan-out status: 'sent' or 'failed'"),
                    )
                    .col(
                        timestamp_with_time_zone(Notifications::SentAt)
                            .default(Expr::current_timestamp()),
                    )
                    .index(
                        Index::create()
                            .name("idx_notifications_sent_at")
                            .col(Notifications::SentAt),
                    )
                    .index(
                        Index::create()
                            .name("idx_notifications_channel_id")
                            .col(Notifications::ChannelId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(NotificationTemplates::Table)
                    .if_not_exists()
                    .col(pk_auto(NotificationTemplates::Id))
                    .col(integer_null(NotificationTemplates::ChannelId))
                    .col(string_len(NotificationTemplates::Name, 64))
                    .col(string_len_uniq(NotificationTemplates::Slug, 64))
                    .col(string_len(NotificationTemplates::Title, 256))
                    .col(string_len(NotificationTemplates::Body, 1024))
                    .col(string_len_null(NotificationTemplates::Icon, 512))
                    .col(string_len_null(NotificationTemplates::Image, 512))
                    .col(string_len_null(NotificationTemplates::Badge, 512))
                    .col(string_len_null(NotificationTemplates::Url, 512))
                    .col(text_null(NotificationTemplates::Actions))
                    .col(
                        ColumnDef::new(NotificationTemplates::Variables)
                            .text()
                            .comment("JSON list of {name, type, required, defaultValue}"),
                    )
                    .col(string_len_uniq(NotificationTemplates::ApiKey, 64))
                    .col(boolean(NotificationTemplates::IsActive).default(true))
                    .col(
                        timestamp_with_time_zone(NotificationTemplates::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(NotificationTemplates::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ScheduledNotifications::Table)
                    .if_not_exists()
                    .col(pk_auto(ScheduledNotifications::Id))
                    .col(integer_null(ScheduledNotifications::ChannelId))
                    .col(string_len(ScheduledNotifications::Title, 256))
                    .col(string_len(ScheduledNotifications::Body, 1024))
                    .col(string_len_null(ScheduledNotifications::Icon, 512))
                    .col(string_len_null(ScheduledNotifications::Image, 512))
                    .col(string_len_null(ScheduledNotifications::Badge, 512))
                    .col(string_len_null(ScheduledNotifications::Url, 512))
                    .col(text_null(ScheduledNotifications::Actions))
                    .col(boolean_null(ScheduledNotifications::RequireInteraction))
                    .col(timestamp_with_time_zone(ScheduledNotifications::ScheduledAt))
                    .col(
                        ColumnDef::new(ScheduledNotifications::Timezone)
                            .string_len(64)
                            .not_null()
                            .default("Europe/Istanbul")
                            .comment("Display-only; scheduled_at is UTC"),
                    )
                    .col(
                        ColumnDef::new(ScheduledNotifications::Repeat)
                            .string_len(16)
                            .not_null()
                            .default("none")
                            .comment("none, daily, weekly or monthly"),
                    )
                    .col(
                        ColumnDef::new(ScheduledNotifications::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending")
                            .comment("pending, sent or cancelled"),
                    )
                    .col(
                        timestamp_with_time_zone(ScheduledNotifications::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .index(
                        Index::create()
                            .name("idx_scheduled_status_scheduled_at")
                            .col(ScheduledNotifications::Status)
                            .col(ScheduledNotifications::ScheduledAt),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(SecurityLogs::Table)
                    .if_not_exists()
                    .col(pk_auto(SecurityLogs::Id))
                    .col(string_len(SecurityLogs::Ip, 64))
                    .col(string_len(SecurityLogs::UserAgent, 512))
                    .col(string_len(SecurityLogs::Method, 8))
                    .col(string_len(SecurityLogs::Path, 256))
                    .col(string_len(SecurityLogs::Event, 64))
                    .col(integer_null(SecurityLogs::Status))
                    .col(text_null(SecurityLogs::Details))
                    .col(
                        timestamp_with_time_zone(SecurityLogs::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .index(
                        Index::create()
                            .name("idx_security_logs_created_at")
                            .col(SecurityLogs::CreatedAt),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SecurityLogs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ScheduledNotifications::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(NotificationTemplates::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Notifications::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Subscriptions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Channels::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Channels {
    Table,
    Id,
    Name,
    Slug,
    ApiKey,
    Color,
    Icon,
    IsActive,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Subscriptions {
    Table,
    Id,
    ChannelId,
    Endpoint,
    P256dh,
    Auth,
    UserAgent,
    IsActive,
    LastUsedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Notifications {
    Table,
    Id,
    ChannelId,
    Title,
    Body,
    Icon,
    Image,
    Badge,
    Url,
    Actions,
    RequireInteraction,
    Status,
    SentAt,
}

#[derive(DeriveIden)]
enum NotificationTemplates {
    Table,
    Id,
    ChannelId,
    Name,
    Slug,
    Title,
    Body,
    Icon,
    Image,
    Badge,
    Url,
    Actions,
    Variables,
    ApiKey,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ScheduledNotifications {
    Table,
    Id,
    ChannelId,
    Title,
    Body,
    Icon,
    Image,
    Badge,
    Url,
    Actions,
    RequireInteraction,
    ScheduledAt,
    Timezone,
    Repeat,
    Status,
    CreatedAt,
}

#[derive(DeriveIden)]
enum SecurityLogs {
    Table,
    Id,
    Ip,
    UserAgent,
    Method,
    Path,
    Event,
    Status,
    Details,
    CreatedAt,
}
