//! Relay state and message handling.
//!
//! [`Relay`] owns every registry and processes one inbound message at a time.
//! It never touches sockets: each call returns the messages to send, tagged
//! with the connection they are addressed to.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::{
    authz::{check_read, check_write},
    capability::validate_auth,
    commons::{registration_ref, CommonsRegistry},
    connection::{ConnId, ConnectionRegistry},
    distribution::{Distributor, EventStore},
    event::{Event, Verifier},
    filter::Filter,
    message::{Inbound, Outbound},
};

/// Outbound message addressed to a connection.
pub type Addressed = (ConnId, Outbound);

/// Connections, commons, stored events and subscriptions.
pub struct Relay {
    verifier: Box<dyn Verifier>,
    next_id: ConnId,
    conns: ConnectionRegistry,
    commons: CommonsRegistry,
    store: EventStore,
    subs: Distributor,
}

impl Relay {
    pub fn new(verifier: impl Verifier + 'static) -> Self {
        Self {
            verifier: Box::new(verifier),
            next_id: 1,
            conns: ConnectionRegistry::new(),
            commons: CommonsRegistry::new(),
            store: EventStore::default(),
            subs: Distributor::new(),
        }
    }

    /// Accept a new connection. The returned `AUTH` challenge must be the
    /// first message sent on it.
    pub fn connect(&mut self) -> (ConnId, Outbound) {
        let id = self.next_id;
        self.next_id += 1;
        let challenge = self.conns.init(id);
        info!(conn = id, open = self.conns.len(), "connection opened");
        (id, Outbound::Auth(challenge))
    }

    /// Forget a connection and every subscription it owns.
    pub fn disconnect(&mut self, id: ConnId) {
        let dropped = self.subs.disconnect(id);
        self.conns.remove(id);
        info!(
            conn = id,
            dropped,
            remaining = self.subs.len(),
            "connection closed"
        );
    }

    /// Process one parsed message from `conn`.
    pub fn handle(&mut self, conn: ConnId, msg: Inbound) -> Vec<Addressed> {
        match msg {
            Inbound::Auth(ev) => vec![(conn, self.auth(conn, &ev, unix_now()))],
            Inbound::Event(ev) => self.publish(conn, ev),
            Inbound::Req { sub_id, filters } => self.subscribe(conn, sub_id, filters),
            Inbound::Close(sub_id) => {
                if self.subs.unsubscribe(conn, &sub_id) {
                    debug!(conn, sub = %sub_id, "subscription closed");
                }
                Vec::new()
            }
        }
    }

    fn auth(&mut self, conn: ConnId, ev: &Event, now: u64) -> Outbound {
        let result = validate_auth(self.conns.get(conn), ev, self.verifier.as_ref(), now);
        match result {
            Ok(auth) => {
                info!(conn, identity = %auth.identity, grants = auth.grants.len(), "authenticated");
                self.conns.update(conn, auth.identity, auth.grants);
                ok(&ev.id, true, String::new())
            }
            Err(err) => {
                warn!(conn, reason = %err, "auth rejected");
                ok(&ev.id, false, err.to_string())
            }
        }
    }

    fn publish(&mut self, conn: ConnId, ev: Event) -> Vec<Addressed> {
        if !self.verifier.verify(&ev) {
            return vec![(
                conn,
                ok(&ev.id, false, "invalid: signature verification failed".into()),
            )];
        }
        if let Err(denied) = check_write(&self.commons, self.conns.get(conn), &ev) {
            debug!(conn, event = %ev.id, reason = %denied, "write denied");
            return vec![(conn, ok(&ev.id, false, denied.to_string()))];
        }
        if let Some(commons_ref) = registration_ref(&ev) {
            if self.commons.register(commons_ref.clone()) {
                info!(commons = %commons_ref, "commons registered");
            }
        }
        let id = ev.id.clone();
        let Some(stored) = self.store.insert(ev) else {
            return vec![(
                conn,
                ok(&id, true, "duplicate: already have this event".into()),
            )];
        };
        let mut out = vec![(conn, ok(&id, true, String::new()))];
        let (conns, commons) = (&self.conns, &self.commons);
        let deliveries = self
            .subs
            .publish(&stored, |owner, ev| check_read(commons, conns.get(owner), ev));
        debug!(event = %id, deliveries = deliveries.len(), "event stored");
        out.extend(deliveries.into_iter().map(|d| {
            (
                d.conn,
                Outbound::Event {
                    sub_id: d.sub_id,
                    event: d.event,
                },
            )
        }));
        out
    }

    fn subscribe(&mut self, conn: ConnId, sub_id: String, filters: Vec<Filter>) -> Vec<Addressed> {
        let (conns, commons) = (&self.conns, &self.commons);
        let backlog = self.subs.subscribe(&self.store, conn, &sub_id, filters, |owner, ev| {
            check_read(commons, conns.get(owner), ev)
        });
        debug!(conn, sub = %sub_id, stored = backlog.len(), "subscription opened");
        let mut out: Vec<Addressed> = backlog
            .into_iter()
            .map(|event| {
                (
                    conn,
                    Outbound::Event {
                        sub_id: sub_id.clone(),
                        event,
                    },
                )
            })
            .collect();
        out.push((conn, Outbound::Eose(sub_id)));
        out
    }

    /// Drop every stored event. Commons registrations survive.
    pub fn clear_events(&mut self) -> usize {
        let n = self.store.len();
        self.store.clear();
        n
    }

    #[cfg(test)]
    pub fn stored(&self) -> usize {
        self.store.len()
    }

    #[cfg(test)]
    pub fn subscriptions(&self) -> usize {
        self.subs.len()
    }
}

fn ok(id: &str, accepted: bool, message: String) -> Outbound {
    Outbound::Ok {
        id: id.to_string(),
        accepted,
        message,
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
