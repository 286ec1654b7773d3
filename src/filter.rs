//! NIP-01 subscription filters.

use std::collections::HashMap;

use serde_json::Value;

use crate::event::Event;

/// One filter object from a `REQ` message.
///
/// Every present field must hold for an event to match. Tag filters are keyed
/// by the single-letter tag name without the `#`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub ids: Option<Vec<String>>,
    pub authors: Option<Vec<String>>,
    pub kinds: Option<Vec<u32>>,
    pub tags: HashMap<String, Vec<String>>,
    pub since: Option<u64>,
    pub until: Option<u64>,
}

impl Filter {
    /// Build a `Filter` from a Nostr filter JSON object.
    pub fn from_value(val: &Value) -> Self {
        let ids = string_array(val.get("ids"));
        let authors = string_array(val.get("authors"));
        let kinds = val.get("kinds").and_then(|v| v.as_array()).map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_u64().and_then(|u| u32::try_from(u).ok()))
                .collect()
        });
        // `#x` keys with a single-character name select on tag values.
        let mut tags = HashMap::new();
        if let Some(obj) = val.as_object() {
            for (key, v) in obj {
                let Some(name) = key.strip_prefix('#') else {
                    continue;
                };
                if name.chars().count() != 1 {
                    continue;
                }
                if let Some(values) = string_array(Some(v)) {
                    tags.insert(name.to_string(), values);
                }
            }
        }
        let since = val.get("since").and_then(|v| v.as_u64());
        let until = val.get("until").and_then(|v| v.as_u64());
        Filter {
            ids,
            authors,
            kinds,
            tags,
            since,
            until,
        }
    }

    /// Whether `ev` satisfies every constraint of this filter.
    pub fn matches(&self, ev: &Event) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.iter().any(|id| *id == ev.id) {
                return false;
            }
        }
        if let Some(authors) = &self.authors {
            if !authors.iter().any(|a| *a == ev.pubkey) {
                return false;
            }
        }
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&ev.kind) {
                return false;
            }
        }
        if self.since.is_some_and(|s| ev.created_at < s) {
            return false;
        }
        if self.until.is_some_and(|u| ev.created_at > u) {
            return false;
        }
        self.tags.iter().all(|(name, wanted)| {
            ev.tags_named(name)
                .filter_map(|t| t.get(1))
                .any(|v| wanted.iter().any(|w| w == v))
        })
    }
}

/// True when any filter in `filters` matches `ev`.
pub fn matches_any(filters: &[Filter], ev: &Event) -> bool {
    filters.iter().any(|f| f.matches(ev))
}

fn string_array(val: Option<&Value>) -> Option<Vec<String>> {
    val.and_then(|v| v.as_array()).map(|arr| {
        arr.iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect()
    })
}
