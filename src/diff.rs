use std::collections::BTreeMap;

use serde::Serialize;

/// Kind of a single key change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Change {
    Added {
        key: String,
        new_value: String,
    },
    Modified {
        key: String,
        old_value: String,
        new_value: String,
    },
    Deleted {
        key: String,
        old_value: String,
    },
}

impl Change {
    pub fn key(&self) -> &str {
        match self {
            Change::Added { key, .. } | Change::Modified { key, .. } | Change::Deleted { key, .. } => {
                key
            }
        }
    }

    pub fn change_type(&self) -> ChangeType {
        match self {
            Change::Added { .. } => ChangeType::Added,
            Change::Modified { .. } => ChangeType::Modified,
            Change::Deleted { .. } => ChangeType::Deleted,
        }
    }

    pub fn old_value(&self) -> Option<&str> {
        match self {
            Change::Added { .. } => None,
            Change::Modified { old_value, .. } | Change::Deleted { old_value, .. } => Some(old_value),
        }
    }

    pub fn new_value(&self) -> Option<&str> {
        match self {
            Change::Added { new_value, .. } | Change::Modified { new_value, .. } => Some(new_value),
            Change::Deleted { .. } => None,
        }
    }
}

/// Changes of one namespace: all additions, then modifications, then
/// deletions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub namespace: String,
    pub changes: Vec<Change>,
}

impl ChangeEvent {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// A cached value as seen by the diff: bare key, value and owning namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OldEntry {
    pub key: String,
    pub value: String,
    pub namespace: String,
}

/// Compute the changes turning `old` into `fresh` for `namespace`.
///
/// Leftover old entries owned by another namespace are never deleted; in
/// bare-key mode the cache hands over every entry, not just this namespace's.
pub fn diff(
    namespace: &str,
    fresh: &BTreeMap<String, String>,
    old: impl IntoIterator<Item = OldEntry>,
) -> ChangeEvent {
    let mut remaining: BTreeMap<String, OldEntry> =
        old.into_iter().map(|e| (e.key.clone(), e)).collect();

    let mut added = Vec::new();
    let mut modified = Vec::new();

    for (key, value) in fresh {
        match remaining.remove(key) {
            Some(prev) if prev.value != *value => modified.push(Change::Modified {
                key: key.clone(),
                old_value: prev.value,
                new_value: value.clone(),
            }),
            Some(_) => {}
            None => added.push(Change::Added {
                key: key.clone(),
                new_value: value.clone(),
            }),
        }
    }

    let deleted = remaining
        .into_values()
        .filter(|e| e.namespace == namespace)
        .map(|e| Change::Deleted {
            key: e.key,
            old_value: e.value,
        });

    let mut changes = added;
    changes.extend(modified);
    changes.extend(deleted);

    ChangeEvent {
        namespace: namespace.to_string(),
        changes,
    }
}

/// Apply an event to a plain key/value view of one namespace.
pub fn apply(event: &ChangeEvent, target: &mut BTreeMap<String, String>) {
    for change in &event.changes {
        match change {
            Change::Added { key, new_value } | Change::Modified { key, new_value, .. } => {
                target.insert(key.clone(), new_value.clone());
            }
            Change::Deleted { key, .. } => {
                target.remove(key);
            }
        }
    }
}
