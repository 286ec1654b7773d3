//! Commons registered on this relay.

use std::collections::HashSet;

use crate::event::{Event, COMMONS_KIND};

/// Prefix every commons reference starts with.
pub const COMMONS_PREFIX: &str = "39002:";

/// Commons under enforcement. Entries are never removed.
#[derive(Debug, Default)]
pub struct CommonsRegistry {
    enforced: HashSet<String>,
}

impl CommonsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start enforcing `commons_ref`. Returns `true` if it was new.
    pub fn register(&mut self, commons_ref: impl Into<String>) -> bool {
        self.enforced.insert(commons_ref.into())
    }

    pub fn is_enforced(&self, commons_ref: &str) -> bool {
        self.enforced.contains(commons_ref)
    }
}

/// The commons an event belongs to: its first `a` tag pointing at a commons.
pub fn commons_ref(ev: &Event) -> Option<&str> {
    ev.tags_named("a")
        .filter_map(|t| t.get(1))
        .find(|r| r.starts_with(COMMONS_PREFIX))
}

/// Owner public key embedded in `<kind>:<owner>:<name>`.
pub fn commons_owner(commons_ref: &str) -> Option<&str> {
    commons_ref.split(':').nth(1)
}

/// Reference registered by `ev` if it is a commons registration event.
pub fn registration_ref(ev: &Event) -> Option<String> {
    if ev.kind != COMMONS_KIND {
        return None;
    }
    let name = ev.tag_value("d")?;
    Some(format!("{}:{}:{}", ev.kind, ev.pubkey, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Tag;

    fn ev(kind: u32, pubkey: &str, tags: Vec<Tag>) -> Event {
        Event {
            id: "id".into(),
            pubkey: pubkey.into(),
            kind,
            created_at: 1,
            tags,
            content: String::new(),
            sig: String::new(),
        }
    }

    #[test]
    fn register_is_idempotent() {
        let mut reg = CommonsRegistry::new();
        assert!(!reg.is_enforced("39002:A:g"));
        assert!(reg.register("39002:A:g"));
        assert!(!reg.register("39002:A:g"));
        assert!(reg.is_enforced("39002:A:g"));
        assert!(!reg.is_enforced("39002:A:h"));
    }

    #[test]
    fn finds_commons_tag() {
        let e = ev(
            1,
            "B",
            vec![
                Tag::new(&["a", "30023:A:post"]),
                Tag::new(&["a", "39002:A:g"]),
            ],
        );
        assert_eq!(commons_ref(&e), Some("39002:A:g"));
        assert_eq!(commons_ref(&ev(1, "B", vec![])), None);
    }

    #[test]
    fn owner_field() {
        assert_eq!(commons_owner("39002:A:g"), Some("A"));
        assert_eq!(commons_owner("39002:"), Some(""));
        assert_eq!(commons_owner("39002"), None);
    }

    #[test]
    fn registration() {
        let reg = ev(39002, "A", vec![Tag::new(&["d", "g"])]);
        assert_eq!(registration_ref(&reg).as_deref(), Some("39002:A:g"));
        assert_eq!(registration_ref(&ev(39002, "A", vec![])), None);
        assert_eq!(registration_ref(&ev(1, "A", vec![Tag::new(&["d", "g"])])), None);
    }
}
