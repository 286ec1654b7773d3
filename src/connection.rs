//! Per-connection authentication state.

use std::collections::HashMap;

use rand::{rngs::OsRng, RngCore};

use crate::grant::Grant;

/// Relay-assigned connection identifier.
pub type ConnId = u64;

/// State kept for one open socket.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub id: ConnId,
    /// Challenge sent on connect; never rotated for the life of the socket.
    pub challenge: String,
    /// Public key established by the latest successful AUTH.
    pub identity: Option<String>,
    /// Grants from the latest successful AUTH.
    pub grants: Vec<Grant>,
}

impl Connection {
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }
}

/// Open connections keyed by id.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    conns: HashMap<ConnId, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` with a fresh challenge and return the challenge.
    pub fn init(&mut self, id: ConnId) -> String {
        let challenge = new_challenge();
        self.conns.insert(
            id,
            Connection {
                id,
                challenge: challenge.clone(),
                identity: None,
                grants: Vec::new(),
            },
        );
        challenge
    }

    pub fn get(&self, id: ConnId) -> Option<&Connection> {
        self.conns.get(&id)
    }

    /// Replace the identity and grants of `id`. Earlier grants are dropped.
    pub fn update(&mut self, id: ConnId, identity: String, grants: Vec<Grant>) {
        if let Some(conn) = self.conns.get_mut(&id) {
            conn.identity = Some(identity);
            conn.grants = grants;
        }
    }

    pub fn remove(&mut self, id: ConnId) -> Option<Connection> {
        self.conns.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }
}

/// 32 bytes from the OS CSPRNG, hex encoded.
fn new_challenge() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
