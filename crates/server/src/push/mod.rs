//! Push delivery collaborator boundary.
//!
//! The dispatcher treats delivery as an opaque `deliver(subscription,
//! payload) -> outcome` call. The production implementation speaks the Web
//! Push protocol ([`web_push::WebPushClient`]); tests substitute their own.

pub mod web_push;

pub use web_push::WebPushClient;

/// The endpoint and encryption keys of one push subscription, as handed to
/// the delivery collaborator.
#[derive(Clone, Debug)]
pub struct PushTarget {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

impl From<&crate::entity::subscription::Model> for PushTarget {
    fn from(sub: &crate::entity::subscription::Model) -> Self {
        Self {
            endpoint: sub.endpoint.clone(),
            p256dh: sub.p256dh.clone(),
            auth: sub.auth.clone(),
        }
    }
}

/// Classified result of a single delivery attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The push service accepted the message.
    Delivered,
    /// The push service reported the endpoint permanently invalid (404/410);
    /// the subscription must be pruned.
    Gone,
    /// Any other failure, including transport timeouts. Transient by
    /// definition; no retry state is kept.
    Failed(String),
}

/// Delivers one payload to one subscription endpoint.
#[async_trait::async_trait]
pub trait PushClient: Send + Sync {
    async fn deliver(&self, target: &PushTarget, payload: &str) -> DeliveryOutcome;
}
