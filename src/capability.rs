//! NIP-42 AUTH validation and capability tokens.
//!
//! An AUTH event may embed a capability token (CAP) as the JSON string value of
//! a `cap` tag. The token is itself a signed event issued by a collective:
//!
//! ```json
//! {
//!   "pubkey": "<collective>",
//!   "tags": [
//!     ["p", "<grantee>"],
//!     ["a", "39002:<collective>:*"],
//!     ["expiry", "1700000000"],
//!     ["cap", "publish", "kind:1"],
//!     ["cap", "access"]
//!   ],
//!   ...
//! }
//! ```
//!
//! Each `cap` tag inside the token becomes one [`Grant`] scoped to the token's
//! `a` commons (or `*` when absent).

use thiserror::Error;

use crate::{
    connection::Connection,
    event::{Event, Tag, Verifier, AUTH_KIND},
    grant::{Action, Grant, WILDCARD},
};

/// Kind used when minting capability tokens. Validation does not depend on it.
pub const CAP_KIND: u32 = 39003;

/// Why an AUTH message was rejected. Display strings go back to the client.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("connection not initialized")]
    NotInitialized,
    #[error("invalid auth kind")]
    InvalidKind,
    #[error("invalid auth signature")]
    InvalidSignature,
    #[error("invalid or missing challenge")]
    BadChallenge,
    #[error("invalid cap JSON")]
    MalformedCap,
    #[error("invalid cap signature")]
    InvalidCapSignature,
    #[error("grantee mismatch")]
    GranteeMismatch,
    #[error("cap expired")]
    Expired,
}

/// Identity and grants established by a successful AUTH.
#[derive(Debug, Clone, PartialEq)]
pub struct Authenticated {
    pub identity: String,
    pub grants: Vec<Grant>,
}

/// Validate `auth` against `conn` at unix time `now`.
///
/// Checks run in a fixed order and the first failure wins. An AUTH without a
/// `cap` tag authenticates its author with no grants.
pub fn validate_auth(
    conn: Option<&Connection>,
    auth: &Event,
    verifier: &dyn Verifier,
    now: u64,
) -> Result<Authenticated, AuthError> {
    let conn = conn.ok_or(AuthError::NotInitialized)?;
    if auth.kind != AUTH_KIND {
        return Err(AuthError::InvalidKind);
    }
    if !verifier.verify(auth) {
        return Err(AuthError::InvalidSignature);
    }
    let challenge_ok = auth
        .tags_named("challenge")
        .any(|t| t.get(1) == Some(conn.challenge.as_str()));
    if !challenge_ok {
        tracing::debug!(conn = conn.id, "auth challenge mismatch");
        return Err(AuthError::BadChallenge);
    }

    let Some(cap_json) = auth.tag_value("cap") else {
        return Ok(Authenticated {
            identity: auth.pubkey.clone(),
            grants: Vec::new(),
        });
    };
    let token: Event = serde_json::from_str(cap_json).map_err(|_| AuthError::MalformedCap)?;
    if !verifier.verify(&token) {
        return Err(AuthError::InvalidCapSignature);
    }
    if token.tag_value("p") != Some(auth.pubkey.as_str()) {
        return Err(AuthError::GranteeMismatch);
    }
    if let Some(expiry) = token.tag_value("expiry") {
        // An unparseable expiry is treated as already expired.
        let expiry: u64 = expiry.trim().parse().map_err(|_| AuthError::Expired)?;
        if expiry < now {
            return Err(AuthError::Expired);
        }
    }

    Ok(Authenticated {
        identity: auth.pubkey.clone(),
        grants: grants_from_token(&token),
    })
}

/// Expand the `cap` tags of a validated token into grants.
pub fn grants_from_token(token: &Event) -> Vec<Grant> {
    let commons = token.tag_value("a").unwrap_or(WILDCARD);
    token
        .tags_named("cap")
        .filter_map(|tag| {
            let raw = tag.get(1)?;
            let action = match raw.parse::<Action>() {
                Ok(action) => action,
                Err(err) => {
                    tracing::debug!(%err, "skipping cap grant");
                    return None;
                }
            };
            let scope = tag.get(2).unwrap_or(WILDCARD);
            Some(Grant::new(action, scope, commons))
        })
        .collect()
}

/// Tags for a capability token granting `grants` to `grantee`.
///
/// Each grant spec is `<action>` or `<action>:<scope>`, e.g. `publish:kind:1`.
pub fn token_tags(
    grantee: &str,
    commons: Option<&str>,
    expiry: Option<u64>,
    grants: &[String],
) -> Vec<Tag> {
    let mut tags = vec![Tag::new(&["p", grantee])];
    if let Some(commons) = commons {
        tags.push(Tag::new(&["a", commons]));
    }
    if let Some(expiry) = expiry {
        tags.push(Tag(vec!["expiry".into(), expiry.to_string()]));
    }
    for spec in grants {
        match spec.split_once(':') {
            Some((action, scope)) => tags.push(Tag::new(&["cap", action, scope])),
            None => tags.push(Tag::new(&["cap", spec])),
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{public_key_hex, sign_event, SchnorrVerifier};

    const NOW: u64 = 1_700_000_000;
    const GRANTEE: [u8; 32] = [2u8; 32];
    const ISSUER: [u8; 32] = [1u8; 32];

    fn conn() -> Connection {
        Connection {
            id: 1,
            challenge: "chal".into(),
            identity: None,
            grants: vec![],
        }
    }

    fn cap(tags: Vec<Tag>) -> String {
        serde_json::to_string(&sign_event(&ISSUER, CAP_KIND, NOW, tags, "").unwrap()).unwrap()
    }

    fn auth(kind: u32, challenge: &str, cap: Option<String>) -> Event {
        let mut tags = vec![Tag::new(&["challenge", challenge])];
        if let Some(cap) = cap {
            tags.push(Tag(vec!["cap".into(), cap]));
        }
        sign_event(&GRANTEE, kind, NOW, tags, "").unwrap()
    }

    fn grantee() -> String {
        public_key_hex(&GRANTEE).unwrap()
    }

    fn run(ev: &Event) -> Result<Authenticated, AuthError> {
        validate_auth(Some(&conn()), ev, &SchnorrVerifier, NOW)
    }

    #[test]
    fn missing_connection() {
        let ev = auth(AUTH_KIND, "chal", None);
        assert_eq!(
            validate_auth(None, &ev, &SchnorrVerifier, NOW),
            Err(AuthError::NotInitialized)
        );
    }

    #[test]
    fn wrong_kind_wins_over_bad_signature() {
        let mut ev = auth(1, "chal", None);
        ev.sig = "00".into();
        assert_eq!(run(&ev), Err(AuthError::InvalidKind));
    }

    #[test]
    fn bad_signature() {
        let mut ev = auth(AUTH_KIND, "chal", None);
        ev.content = "tampered".into();
        assert_eq!(run(&ev), Err(AuthError::InvalidSignature));
    }

    #[test]
    fn wrong_or_missing_challenge() {
        assert_eq!(run(&auth(AUTH_KIND, "other", None)), Err(AuthError::BadChallenge));
        let ev = sign_event(&GRANTEE, AUTH_KIND, NOW, vec![], "").unwrap();
        assert_eq!(run(&ev), Err(AuthError::BadChallenge));
    }

    #[test]
    fn plain_auth_has_no_grants() {
        let ok = run(&auth(AUTH_KIND, "chal", None)).unwrap();
        assert_eq!(ok.identity, grantee());
        assert!(ok.grants.is_empty());
    }

    #[test]
    fn challenge_can_be_reused() {
        let ev = auth(AUTH_KIND, "chal", None);
        assert!(run(&ev).is_ok());
        assert!(run(&ev).is_ok());
    }

    #[test]
    fn malformed_cap() {
        let ev = auth(AUTH_KIND, "chal", Some("{not json".into()));
        assert_eq!(run(&ev), Err(AuthError::MalformedCap));
    }

    #[test]
    fn cap_with_bad_signature() {
        let mut token = sign_event(&ISSUER, CAP_KIND, NOW, token_tags(&grantee(), None, None, &[]), "")
            .unwrap();
        token.sig = "11".repeat(64);
        let ev = auth(AUTH_KIND, "chal", Some(serde_json::to_string(&token).unwrap()));
        assert_eq!(run(&ev), Err(AuthError::InvalidCapSignature));
    }

    #[test]
    fn cap_for_someone_else() {
        let other = public_key_hex(&[3u8; 32]).unwrap();
        let ev = auth(
            AUTH_KIND,
            "chal",
            Some(cap(token_tags(&other, None, None, &["publish".into()]))),
        );
        assert_eq!(run(&ev), Err(AuthError::GranteeMismatch));
    }

    #[test]
    fn expiry_boundaries() {
        let past = auth(
            AUTH_KIND,
            "chal",
            Some(cap(token_tags(&grantee(), None, Some(NOW - 1), &[]))),
        );
        assert_eq!(run(&past), Err(AuthError::Expired));

        let exact = auth(
            AUTH_KIND,
            "chal",
            Some(cap(token_tags(&grantee(), None, Some(NOW), &[]))),
        );
        assert!(run(&exact).is_ok());

        let garbage = auth(
            AUTH_KIND,
            "chal",
            Some(cap(vec![
                Tag::new(&["p", &grantee()]),
                Tag::new(&["expiry", "soon"]),
            ])),
        );
        assert_eq!(run(&garbage), Err(AuthError::Expired));
    }

    #[test]
    fn grants_carry_token_commons() {
        let tags = token_tags(
            &grantee(),
            Some("39002:A:*"),
            None,
            &["publish:kind:1".into(), "access".into(), "bogus".into()],
        );
        let ok = run(&auth(AUTH_KIND, "chal", Some(cap(tags)))).unwrap();
        assert_eq!(
            ok.grants,
            vec![
                Grant::new(Action::Publish, "kind:1", "39002:A:*"),
                Grant::new(Action::Access, "*", "39002:A:*"),
            ]
        );
    }

    #[test]
    fn commons_defaults_to_wildcard() {
        let tags = token_tags(&grantee(), None, None, &["publish:7".into()]);
        let ok = run(&auth(AUTH_KIND, "chal", Some(cap(tags)))).unwrap();
        assert_eq!(ok.grants, vec![Grant::new(Action::Publish, "7", "*")]);
    }
}
