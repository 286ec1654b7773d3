//! Grants carried by a capability token and the predicates that match them.

use std::{fmt, str::FromStr};

/// Wildcard accepted for both scope and commons references.
pub const WILDCARD: &str = "*";

/// Operation a grant authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Publish,
    Delete,
    Access,
    Delegate,
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "publish" => Ok(Action::Publish),
            "delete" => Ok(Action::Delete),
            "access" => Ok(Action::Access),
            "delegate" => Ok(Action::Delegate),
            other => Err(format!("unknown action: {other}")),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Publish => "publish",
            Action::Delete => "delete",
            Action::Access => "access",
            Action::Delegate => "delegate",
        };
        f.write_str(s)
    }
}

/// One authorization unit: `action` on events of `scope` within `commons`.
///
/// `scope` is `*`, a bare kind number or `kind:<N>`. `commons` is `*`, an exact
/// commons reference, or a prefix ending in `:*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub action: Action,
    pub scope: String,
    pub commons: String,
}

impl Grant {
    pub fn new(action: Action, scope: impl Into<String>, commons: impl Into<String>) -> Self {
        Self {
            action,
            scope: scope.into(),
            commons: commons.into(),
        }
    }

    /// Whether this grant lets its holder publish `kind` into `commons_ref`.
    pub fn allows_publish(&self, kind: u32, commons_ref: &str) -> bool {
        self.action == Action::Publish
            && scope_matches(&self.scope, kind)
            && commons_matches(&self.commons, commons_ref)
    }

    /// Whether this grant lets its holder read from `commons_ref`. Read access
    /// covers every kind.
    pub fn allows_read(&self, commons_ref: &str) -> bool {
        matches!(self.action, Action::Access | Action::Publish)
            && commons_matches(&self.commons, commons_ref)
    }
}

/// True iff `scope` is `*`, the bare kind number, or `kind:<kind>`.
pub fn scope_matches(scope: &str, kind: u32) -> bool {
    if scope == WILDCARD {
        return true;
    }
    let kind = kind.to_string();
    let bare = scope.strip_prefix("kind:").unwrap_or(scope);
    bare == kind
}

/// True iff `grant_ref` is `*`, equals `target` exactly, or is a `<prefix>:*`
/// pattern whose `<prefix>:` starts `target`.
pub fn commons_matches(grant_ref: &str, target: &str) -> bool {
    if grant_ref == WILDCARD || grant_ref == target {
        return true;
    }
    match grant_ref.strip_suffix('*') {
        Some(prefix) if prefix.ends_with(':') => target.starts_with(prefix),
        _ => false,
    }
}
