//! Dual-mode bearer authentication for the notify surface.
//!
//! A bearer token is either the configured global secret (unscoped access)
//! or an active channel's API key (access scoped to that channel). The
//! resolved [`Auth`] is threaded explicitly instead of a nullable channel id
//! checked ad hoc at each use site.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::json;
use subtle::ConstantTimeEq;

use crate::AppResources;
use crate::entity::channel;
use crate::error::ApiError;
use crate::security::client_ip::client_identifier;
use crate::security::log::SecurityEvent;

/// The authenticated principal of a request.
#[derive(Clone, Debug)]
pub enum Auth {
    /// Holder of the global API secret; notifications are unscoped.
    Global,
    /// Holder of a channel API key; notifications carry that channel.
    Channel(channel::Model),
}

impl Auth {
    pub fn channel_id(&self) -> Option<i32> {
        match self {
            Auth::Global => None,
            Auth::Channel(channel) => Some(channel.id),
        }
    }

    /// Label used in responses and logs: "global" or "channel #<id>".
    pub fn describe(&self) -> String {
        match self {
            Auth::Global => "global".to_string(),
            Auth::Channel(channel) => format!("channel #{}", channel.id),
        }
    }
}

/// Resolve a bearer token to an [`Auth`] principal.
///
/// The global secret is compared in constant time; anything else is looked
/// up as a channel API key and must belong to an active channel.
pub async fn resolve_bearer(resources: &AppResources, token: &str) -> Result<Auth, ApiError> {
    let global = resources.config.api_secret.as_bytes();
    if bool::from(token.as_bytes().ct_eq(global)) {
        return Ok(Auth::Global);
    }

    let channel = channel::Entity::find()
        .filter(channel::Column::ApiKey.eq(token))
        .one(resources.db.as_ref())
        .await?;

    match channel {
        Some(channel) if channel.is_active => Ok(Auth::Channel(channel)),
        Some(_) => Err(ApiError::Unauthorized("Unauthorized".into())),
        None => Err(ApiError::Unauthorized("Unauthorized".into())),
    }
}

/// Axum extractor performing dual-mode bearer authentication.
///
/// Denials emit an `AUTH_FAILED` security event before rejecting.
pub struct BearerAuth(pub Auth);

impl<S> FromRequestParts<S> for BearerAuth
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let resources = parts
            .extensions
            .get::<AppResources>()
            .cloned()
            .ok_or_else(|| {
                tracing::error!(
                    name = "auth.missing_resources",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    message = "AppResources not found in request extensions"
                );
                ApiError::Internal(sea_orm::DbErr::Custom("missing app resources".into()))
            })?;

        let token = bearer_token(parts);
        let event = || {
            let ip = client_identifier(&parts.headers);
            let user_agent = parts
                .headers
                .get("user-agent")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            SecurityEvent::new(&ip, user_agent, parts.method.as_str(), parts.uri.path())
        };

        let Some(token) = token else {
            resources
                .security_log
                .record(event().with_event("AUTH_FAILED").with_status(401))
                .await;
            return Err(ApiError::Unauthorized("Unauthorized".into()));
        };

        match resolve_bearer(&resources, token).await {
            Ok(auth) => {
                resources
                    .security_log
                    .record(
                        event()
                            .with_event("AUTH_SUCCESS")
                            .with_details(json!({ "principal": auth.describe() })),
                    )
                    .await;
                Ok(BearerAuth(auth))
            }
            Err(e) => {
                resources
                    .security_log
                    .record(event().with_event("AUTH_FAILED").with_status(401))
                    .await;
                Err(e)
            }
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
}
