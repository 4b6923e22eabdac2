//! Record-level diff: compare a saved snapshot with a document's current
//! stored form.
//!
//! Changes are reported per dotted path. Nested objects present on both
//! sides are compared field by field unless `replace_objects` is set, in
//! which case any difference replaces the whole object.

use serde_json::{Map, Value};
use weave_types::Record;

use crate::error::{StateError, StateResult};

/// A snapshot of a document's stored form.
pub type Snapshot = Record;

/// Capture `stored` as the document's saved state.
pub fn capture(stored: &Record) -> Snapshot {
    stored.clone()
}

/// The result of comparing two records.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StateDiff {
    /// The list of changes.
    pub changes: Vec<StateChange>,
}

impl StateDiff {
    /// Create an empty diff.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if there are no changes.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of changes.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Changed paths with their new values, as a flat `path -> value` map.
    pub fn set_fields(&self) -> Record {
        let mut set = Map::new();
        for change in &self.changes {
            match change {
                StateChange::Added { path, value } | StateChange::Modified { path, new: value, .. } => {
                    set.insert(path.clone(), value.clone());
                }
                StateChange::Removed { .. } => {}
            }
        }
        set
    }

    /// The update document applying this diff: `$set` for added and
    /// modified paths, `$unset` for removed ones. Empty when nothing
    /// changed.
    pub fn to_update(&self) -> Record {
        let set = self.set_fields();
        let unset: Map<String, Value> = self
            .changes
            .iter()
            .filter_map(|c| match c {
                StateChange::Removed { path, .. } => Some((path.clone(), Value::String(String::new()))),
                _ => None,
            })
            .collect();

        let mut update = Map::new();
        if !set.is_empty() {
            update.insert("$set".into(), Value::Object(set));
        }
        if !unset.is_empty() {
            update.insert("$unset".into(), Value::Object(unset));
        }
        update
    }
}

/// A single change at a dotted path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateChange {
    /// A path was added.
    Added { path: String, value: Value },
    /// A path was removed.
    Removed { path: String, value: Value },
    /// A path's value was modified.
    Modified { path: String, old: Value, new: Value },
}

impl StateChange {
    pub fn path(&self) -> &str {
        match self {
            Self::Added { path, .. } | Self::Removed { path, .. } | Self::Modified { path, .. } => path,
        }
    }
}

/// Replay `diff` onto `target`: added and modified paths are set, removed
/// paths are dropped.
///
/// Every segment of a path but the last must name an existing object in
/// `target`. Changes are applied in order, so on error `target` holds the
/// changes before the failing one.
///
/// # Errors
///
/// Returns [`StateError::ApplyChanges`] naming the first path that cannot
/// be applied.
pub fn apply_changes(target: &mut Record, diff: &StateDiff) -> StateResult<()> {
    for change in &diff.changes {
        let path = change.path();
        let mut segments: Vec<&str> = path.split('.').collect();
        let Some(last) = segments.pop() else {
            continue;
        };
        let mut current = &mut *target;
        for segment in segments {
            current = match current.get_mut(segment) {
                Some(Value::Object(next)) => next,
                _ => return Err(StateError::ApplyChanges { path: path.to_string() }),
            };
        }
        match change {
            StateChange::Added { value, .. } | StateChange::Modified { new: value, .. } => {
                current.insert(last.to_string(), value.clone());
            }
            StateChange::Removed { .. } => {
                current.remove(last);
            }
        }
    }
    Ok(())
}

/// Compute the diff between two records.
///
/// Paths present only in `new` are `Added`, paths present only in `old` are
/// `Removed`, and paths present in both with different values are
/// `Modified`.
pub fn diff_states(old: &Record, new: &Record, replace_objects: bool) -> StateDiff {
    let mut changes = Vec::new();
    diff_into(old, new, "", replace_objects, &mut changes);
    StateDiff { changes }
}

fn diff_into(old: &Record, new: &Record, prefix: &str, replace_objects: bool, changes: &mut Vec<StateChange>) {
    let path_of = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}.{key}")
        }
    };

    for (key, old_val) in old {
        match new.get(key) {
            Some(new_val) if old_val == new_val => {}
            Some(new_val) => match (old_val, new_val) {
                (Value::Object(o), Value::Object(n)) if !replace_objects => {
                    diff_into(o, n, &path_of(key), replace_objects, changes);
                }
                _ => changes.push(StateChange::Modified {
                    path: path_of(key),
                    old: old_val.clone(),
                    new: new_val.clone(),
                }),
            },
            None => changes.push(StateChange::Removed {
                path: path_of(key),
                value: old_val.clone(),
            }),
        }
    }

    for (key, new_val) in new {
        if !old.contains_key(key) {
            changes.push(StateChange::Added {
                path: path_of(key),
                value: new_val.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn identical_records_no_diff() {
        let state = record(json!({"a": 1, "b": "hello", "c": {"d": [1, 2]}}));
        let diff = diff_states(&state, &state, false);
        assert!(diff.is_empty());
        assert!(diff.to_update().is_empty());
    }

    #[test]
    fn mixed_changes() {
        let old = record(json!({"keep": true, "modify": "old", "remove": 42}));
        let new = record(json!({"keep": true, "modify": "new", "added": [1, 2, 3]}));

        let diff = diff_states(&old, &new, false);
        assert_eq!(diff.len(), 3);
        assert!(diff.changes.contains(&StateChange::Removed {
            path: "remove".into(),
            value: json!(42),
        }));
        assert_eq!(
            Value::Object(diff.to_update()),
            json!({"$set": {"modify": "new", "added": [1, 2, 3]}, "$unset": {"remove": ""}})
        );
    }

    #[test]
    fn nested_objects_diff_by_path() {
        let old = record(json!({"config": {"debug": false, "port": 8080}}));
        let new = record(json!({"config": {"debug": true, "port": 8080}}));

        let diff = diff_states(&old, &new, false);
        assert_eq!(diff.changes[0].path(), "config.debug");
        assert_eq!(Value::Object(diff.set_fields()), json!({"config.debug": true}));
    }

    #[test]
    fn replace_objects_sets_whole_value() {
        let old = record(json!({"config": {"debug": false, "port": 8080}}));
        let new = record(json!({"config": {"debug": true, "port": 8080}}));

        let diff = diff_states(&old, &new, true);
        assert_eq!(
            Value::Object(diff.set_fields()),
            json!({"config": {"debug": true, "port": 8080}})
        );
    }

    #[test]
    fn type_change_is_a_modification() {
        let old = record(json!({"value": {"a": 1}}));
        let new = record(json!({"value": "forty-two"}));
        let diff = diff_states(&old, &new, false);
        assert!(matches!(&diff.changes[..], [StateChange::Modified { path, .. }] if path == "value"));
    }

    #[test]
    fn null_value_handling() {
        let old = record(json!({"nullable": null}));
        let new = record(json!({"nullable": "not null"}));
        let diff = diff_states(&old, &new, false);
        assert!(matches!(&diff.changes[..], [StateChange::Modified { old, .. }] if old.is_null()));
    }

    // ----------------------------------------------------------------
    // Replaying changes
    // ----------------------------------------------------------------

    #[test]
    fn changes_replay_onto_a_newer_record() {
        let saved = record(json!({"name": "a", "n": 1, "opts": {"x": 1, "y": 2}, "gone": true}));
        let local = record(json!({"name": "b", "n": 1, "opts": {"x": 5, "y": 2}}));
        let remote = record(json!({"name": "a", "n": 100, "opts": {"x": 1, "y": 3}, "gone": true}));

        let mut merged = remote.clone();
        apply_changes(&mut merged, &diff_states(&saved, &local, false)).unwrap();
        assert_eq!(
            Value::Object(merged),
            json!({"name": "b", "n": 100, "opts": {"x": 5, "y": 3}})
        );
    }

    #[test]
    fn replay_through_a_scalar_fails() {
        let saved = record(json!({"d": {"o": {"s": "foo"}}}));
        let local = record(json!({"d": {"o": {"s": {"foo": "bar"}}}}));
        let mut remote = record(json!({"d": {"o": "nothing"}}));

        let err = apply_changes(&mut remote, &diff_states(&saved, &local, false)).unwrap_err();
        assert_eq!(err, StateError::ApplyChanges { path: "d.o.s".into() });
    }

    fn flat_record() -> impl Strategy<Value = Record> {
        proptest::collection::btree_map("[a-e]", 0i64..4, 0..5).prop_map(|m| {
            m.into_iter().map(|(k, v)| (k, json!(v))).collect()
        })
    }

    proptest! {
        #[test]
        fn update_turns_old_into_new(old in flat_record(), new in flat_record()) {
            let diff = diff_states(&old, &new, true);
            let mut applied = old.clone();
            for change in &diff.changes {
                match change {
                    StateChange::Removed { path, .. } => {
                        applied.remove(path);
                    }
                    StateChange::Added { path, value } | StateChange::Modified { path, new: value, .. } => {
                        applied.insert(path.clone(), value.clone());
                    }
                }
            }
            prop_assert_eq!(applied, new);
        }
    }
}
