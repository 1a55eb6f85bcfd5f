//! Outbound "event state changed" facts for an external dispatcher
use super::event::{EventStatus, TimeStamp};
use chrono::Utc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Decided,
    Resubmitted,
    FinalDateSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub event_id: String,
    pub org_id: String,
    pub kind: ChangeKind,
    pub status: EventStatus,
    pub actor_id: String,
    pub at: TimeStamp<Utc>,
}

/// Receives every committed state change. Delivery (mail, queues) is the implementor's concern.
pub trait Notifier: Send + Sync {
    fn event_changed(&self, change: &StateChange);
}

/// Default notifier: drops every change.
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn event_changed(&self, _: &StateChange) {}
}
