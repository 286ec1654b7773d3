//! Nostr event model, canonical hashing and Schnorr signatures.

use anyhow::{anyhow, Result};
use secp256k1::{schnorr::Signature, Keypair, Message, Secp256k1, XOnlyPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Kind of the NIP-42 authentication event.
pub const AUTH_KIND: u32 = 22242;

/// Kind of the event that registers a commons.
pub const COMMONS_KIND: u32 = 39002;

/// Wrapper for a Nostr tag expressed as an array of strings.
///
/// Tags appear as small arrays where the first element denotes the type and the
/// following elements hold data. The ones this relay reads are:
///
/// - `a` – reference to a commons, `39002:<owner>:<name>`
/// - `d` – local name of a commons on its registration event
/// - `p` – grantee of a capability token
/// - `challenge` – the AUTH challenge echoed back by the client
/// - `cap` – an embedded capability token, or a grant inside one
/// - `expiry` – unix seconds after which a capability token is void
///
/// Each tag is stored verbatim so uncommon or custom tags are preserved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag(pub Vec<String>);

impl Tag {
    /// Build a tag from string slices.
    pub fn new(parts: &[&str]) -> Self {
        Tag(parts.iter().map(|s| s.to_string()).collect())
    }

    /// Tag name (first element).
    pub fn name(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Element at `idx`, if present.
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.0.get(idx).map(String::as_str)
    }
}

/// Core Nostr event relayed to clients.
///
/// ```json
/// {
///   "id": "aa11",
///   "pubkey": "npub...",
///   "kind": 1,
///   "created_at": 1700000000,
///   "tags": [["a", "39002:<owner>:general"]],
///   "content": "hello",
///   "sig": "deadbeef"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Event identifier (hex of SHA-256 hash).
    pub id: String,
    /// Author public key (hex).
    pub pubkey: String,
    /// Kind number, e.g. `1` or `39002`.
    pub kind: u32,
    /// Unix timestamp of creation.
    pub created_at: u64,
    /// Arbitrary tags such as `a` (commons) or `d` (identifier).
    pub tags: Vec<Tag>,
    /// Event content body.
    pub content: String,
    /// Schnorr signature over the event hash.
    pub sig: String,
}

impl Event {
    /// Iterate over tags named `name`.
    pub fn tags_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Tag> + 'a {
        self.tags.iter().filter(move |t| t.name() == Some(name))
    }

    /// First value of the first tag named `name`.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .filter(|t| t.name() == Some(name))
            .find_map(|t| t.get(1))
    }
}

/// Recompute the Nostr event hash from its fields.
pub fn event_hash(ev: &Event) -> Result<[u8; 32]> {
    let arr = serde_json::json!([0, ev.pubkey, ev.created_at, ev.kind, ev.tags, ev.content]);
    let data = serde_json::to_vec(&arr)?;
    let hash = Sha256::digest(&data);
    Ok(hash.into())
}

/// Verify an event's ID and Schnorr signature.
pub fn verify_event(ev: &Event) -> Result<()> {
    let hash = event_hash(ev)?;
    let calc_id = hex::encode(hash);
    if calc_id != ev.id {
        return Err(anyhow!("id mismatch"));
    }
    let sig = Signature::from_slice(&hex::decode(&ev.sig)?)?;
    let pk = XOnlyPublicKey::from_slice(&hex::decode(&ev.pubkey)?)?;
    let secp = Secp256k1::verification_only();
    let msg = Message::from_digest_slice(&hash)?;
    secp.verify_schnorr(&sig, &msg, &pk)?;
    Ok(())
}

/// Build and sign an event with the given secret key.
pub fn sign_event(
    secret_key: &[u8],
    kind: u32,
    created_at: u64,
    tags: Vec<Tag>,
    content: &str,
) -> Result<Event> {
    let secp = Secp256k1::new();
    let kp = Keypair::from_seckey_slice(&secp, secret_key)?;
    let mut ev = Event {
        id: String::new(),
        pubkey: hex::encode(kp.x_only_public_key().0.serialize()),
        kind,
        created_at,
        tags,
        content: content.to_string(),
        sig: String::new(),
    };
    let hash = event_hash(&ev)?;
    ev.id = hex::encode(hash);
    let msg = Message::from_digest_slice(&hash)?;
    let sig = secp.sign_schnorr_no_aux_rand(&msg, &kp);
    ev.sig = hex::encode(sig.as_ref());
    Ok(ev)
}

/// Hex x-only public key for a secret key.
#[cfg(test)]
pub fn public_key_hex(secret_key: &[u8]) -> Result<String> {
    let secp = Secp256k1::new();
    let kp = Keypair::from_seckey_slice(&secp, secret_key)?;
    Ok(hex::encode(kp.x_only_public_key().0.serialize()))
}

/// Signature check consulted before an event or token is trusted.
pub trait Verifier: Send + Sync {
    /// Return `true` when `ev` carries a valid id and signature.
    fn verify(&self, ev: &Event) -> bool;
}

/// BIP-340 Schnorr verification over the NIP-01 event hash.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchnorrVerifier;

impl Verifier for SchnorrVerifier {
    fn verify(&self, ev: &Event) -> bool {
        match verify_event(ev) {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(event = %ev.id, %err, "signature check failed");
                false
            }
        }
    }
}
