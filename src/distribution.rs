//! Volatile event store and live subscriptions.

use std::{collections::HashMap, sync::Arc};

use crate::{
    connection::ConnId,
    event::Event,
    filter::{matches_any, Filter},
};

/// In-memory events keyed by id. Cleared wholesale by the eviction timer.
#[derive(Debug, Default)]
pub struct EventStore {
    events: HashMap<String, Arc<Event>>,
}

impl EventStore {
    /// Store `ev`. Returns `None` if an event with the same id is present.
    pub fn insert(&mut self, ev: Event) -> Option<Arc<Event>> {
        if self.events.contains_key(&ev.id) {
            return None;
        }
        let ev = Arc::new(ev);
        self.events.insert(ev.id.clone(), Arc::clone(&ev));
        Some(ev)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Event>> {
        self.events.values()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

/// A live `REQ` owned by one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub owner: ConnId,
    pub local_id: String,
    pub filters: Vec<Filter>,
}

/// An event bound for one subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub conn: ConnId,
    pub sub_id: String,
    pub event: Arc<Event>,
}

/// Subscriptions keyed by `(owner, local id)`.
#[derive(Debug, Default)]
pub struct Distributor {
    subs: HashMap<(ConnId, String), Subscription>,
}

impl Distributor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription and return the stored events it may see.
    ///
    /// A subscription with the same id on the same connection is replaced.
    /// `can_read` is consulted for every filter match.
    pub fn subscribe(
        &mut self,
        store: &EventStore,
        owner: ConnId,
        local_id: &str,
        filters: Vec<Filter>,
        mut can_read: impl FnMut(ConnId, &Event) -> bool,
    ) -> Vec<Arc<Event>> {
        let backlog = store
            .iter()
            .filter(|ev| matches_any(&filters, ev) && can_read(owner, ev))
            .cloned()
            .collect();
        self.subs.insert(
            (owner, local_id.to_string()),
            Subscription {
                owner,
                local_id: local_id.to_string(),
                filters,
            },
        );
        backlog
    }

    /// Drop one subscription. Returns whether it existed.
    pub fn unsubscribe(&mut self, owner: ConnId, local_id: &str) -> bool {
        self.subs.remove(&(owner, local_id.to_string())).is_some()
    }

    /// Drop every subscription owned by `owner`. Returns how many were removed.
    pub fn disconnect(&mut self, owner: ConnId) -> usize {
        let before = self.subs.len();
        self.subs.retain(|(conn, _), _| *conn != owner);
        before - self.subs.len()
    }

    /// Deliveries for a newly stored event.
    pub fn publish(
        &self,
        ev: &Arc<Event>,
        mut can_read: impl FnMut(ConnId, &Event) -> bool,
    ) -> Vec<Delivery> {
        self.subs
            .values()
            .filter(|sub| matches_any(&sub.filters, ev) && can_read(sub.owner, ev))
            .map(|sub| Delivery {
                conn: sub.owner,
                sub_id: sub.local_id.clone(),
                event: Arc::clone(ev),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.subs.len()
    }
}
