//! OpenAPI/Utoipa configuration.

use crate::api::{
    channels::CHANNELS_TAG, health::MISC_TAG, notifications::HISTORY_TAG, notify::NOTIFY_TAG,
    schedule::SCHEDULE_TAG, subscriptions::SUBSCRIPTIONS_TAG, templates::TEMPLATES_TAG,
};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

/// Security addon for OpenAPI documentation.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            let bearer = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .description(Some(
                    "The global API secret, or a channel API key for channel-scoped access.",
                ))
                .build();
            components.add_security_scheme("Authorization", SecurityScheme::Http(bearer));
        }
    }
}

/// OpenAPI documentation configuration.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Push Gateway API",
        version = "1.0.0",
        description = "Webhook-to-Web-Push notification gateway."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = NOTIFY_TAG, description = "Webhook fan-out endpoint"),
        (name = SUBSCRIPTIONS_TAG, description = "Push subscription management"),
        (name = CHANNELS_TAG, description = "Channel administration"),
        (name = TEMPLATES_TAG, description = "Notification template administration"),
        (name = SCHEDULE_TAG, description = "Scheduled notifications"),
        (name = HISTORY_TAG, description = "Notification history and statistics")
    )
)]
pub struct ApiDoc;
