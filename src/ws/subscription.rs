//! Per-connection subscription manager.
//!
//! Tracks which causes a WebSocket client is subscribed to and provides
//! server-side event filtering.

use std::collections::HashSet;

use crate::domain::CauseId;

/// Manages the set of cause subscriptions for a single WebSocket connection.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    /// Subscribed cause ids. Ignored while `subscribe_all` is set.
    cause_ids: HashSet<CauseId>,
    /// Wildcard `"*"` subscription.
    subscribe_all: bool,
}

impl SubscriptionManager {
    /// Creates a new empty subscription manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds cause ids to the subscription set, optionally enabling the
    /// wildcard.
    pub fn subscribe(&mut self, ids: &[CauseId], wildcard: bool) {
        if wildcard {
            self.subscribe_all = true;
        }
        self.cause_ids.extend(ids.iter().copied());
    }

    /// Removes cause ids from the subscription set. `wildcard` clears the
    /// wildcard subscription as well.
    pub fn unsubscribe(&mut self, ids: &[CauseId], wildcard: bool) {
        if wildcard {
            self.subscribe_all = false;
        }
        for id in ids {
            self.cause_ids.remove(id);
        }
    }

    /// Returns `true` if the cause matches the subscription filter.
    #[must_use]
    pub fn matches(&self, cause_id: CauseId) -> bool {
        self.subscribe_all || self.cause_ids.contains(&cause_id)
    }

    /// Returns the number of explicitly subscribed causes.
    #[must_use]
    pub fn count(&self) -> usize {
        self.cause_ids.len()
    }

    /// Returns `true` if the wildcard subscription is active.
    #[must_use]
    pub fn is_subscribed_all(&self) -> bool {
        self.subscribe_all
    }
}
