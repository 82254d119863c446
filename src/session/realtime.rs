//! Server-side filters for the unread-counter subscriptions.

use uuid::Uuid;

use super::EffectiveIdentity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub channel: &'static str,
    pub table: &'static str,
    pub filter: String,
}

/// Notification and message counter subscriptions for the person behind
/// `identity`. Delegated sessions key on the sub-user id so they see their
/// own counts rather than the admin's.
pub fn counter_subscriptions(identity: &EffectiveIdentity) -> [Subscription; 2] {
    let id = identity.display_id();
    [
        Subscription {
            channel: "layout-notifications",
            table: "notifications",
            filter: eq_filter("user_id", id),
        },
        Subscription {
            channel: "layout-messages",
            table: "messages",
            filter: eq_filter("sent_to", id),
        },
    ]
}

/// Whether subscriptions built for `previous` are stale for `next`.
pub fn needs_resubscribe(
    previous: Option<&EffectiveIdentity>,
    next: Option<&EffectiveIdentity>,
) -> bool {
    previous.map(EffectiveIdentity::display_id) != next.map(EffectiveIdentity::display_id)
}

fn eq_filter(column: &str, id: Uuid) -> String {
    format!("{column}=eq.{id}")
}
