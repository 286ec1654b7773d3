//! Write and read authorization for events that belong to a commons.
//!
//! Events outside any enforced commons are unrestricted. Inside one, the
//! owner always writes; everyone else needs an authenticated connection whose
//! grants cover the event.

use thiserror::Error;

use crate::{
    commons::{commons_owner, commons_ref, CommonsRegistry},
    connection::Connection,
    event::Event,
};

/// Why a write was refused. Display strings go back to the client.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WriteDenied {
    #[error("auth-required: commons {0} requires authentication")]
    AuthRequired(String),
    #[error("blocked: event author does not match authenticated identity")]
    IdentityMismatch,
    #[error("blocked: no publish grant for kind {kind} in commons {commons}")]
    NoGrant { kind: u32, commons: String },
}

/// Enforced commons `ev` belongs to, if any.
fn enforced_commons<'a>(commons: &CommonsRegistry, ev: &'a Event) -> Option<&'a str> {
    commons_ref(ev).filter(|r| commons.is_enforced(r))
}

/// Decide whether `conn` may publish `ev`.
pub fn check_write(
    commons: &CommonsRegistry,
    conn: Option<&Connection>,
    ev: &Event,
) -> Result<(), WriteDenied> {
    let Some(target) = enforced_commons(commons, ev) else {
        return Ok(());
    };
    if commons_owner(target) == Some(ev.pubkey.as_str()) {
        return Ok(());
    }
    let Some((conn, identity)) = conn.and_then(|c| c.identity.as_deref().map(|id| (c, id))) else {
        return Err(WriteDenied::AuthRequired(target.to_string()));
    };
    if ev.pubkey != identity {
        return Err(WriteDenied::IdentityMismatch);
    }
    if conn.grants.iter().any(|g| g.allows_publish(ev.kind, target)) {
        Ok(())
    } else {
        Err(WriteDenied::NoGrant {
            kind: ev.kind,
            commons: target.to_string(),
        })
    }
}

/// Decide whether `conn` may receive `ev`.
pub fn check_read(commons: &CommonsRegistry, conn: Option<&Connection>, ev: &Event) -> bool {
    let Some(target) = enforced_commons(commons, ev) else {
        return true;
    };
    match conn {
        Some(conn) if conn.is_authenticated() => {
            conn.grants.iter().any(|g| g.allows_read(target))
        }
        _ => false,
    }
}
