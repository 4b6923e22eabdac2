//! Update-document evaluation for the in-memory store.
//!
//! Supported operators: `$set`, `$unset`, `$inc`, `$push`, `$min`, `$max`.
//! Paths are dotted; intermediate objects are created on demand and numeric
//! segments index into existing arrays.

use std::cmp::Ordering;

use serde_json::{Map, Value};
use weave_types::{Record, ID_FIELD};

use crate::error::{StoreError, StoreResult};
use crate::filter::{compare_values, values_equal};

/// Returns `true` if every key of `update` is an update operator.
pub fn is_update_document(update: &Record) -> bool {
    !update.is_empty() && update.keys().all(|k| k.starts_with('$'))
}

/// Apply `update` to `doc`. Returns `true` if the document changed.
pub fn apply_update(doc: &mut Record, update: &Record) -> StoreResult<bool> {
    if !is_update_document(update) {
        return Err(StoreError::InvalidUpdate(
            "update document must only contain operators".into(),
        ));
    }
    let before = doc.clone();
    for (op, fields) in update {
        let fields = fields
            .as_object()
            .ok_or_else(|| StoreError::InvalidUpdate(format!("{op} expects a document")))?;
        for (path, operand) in fields {
            if path == ID_FIELD {
                let unchanged = get_path(doc, path).is_some_and(|v| values_equal(v, operand));
                if !unchanged {
                    return Err(StoreError::InvalidUpdate("_id is immutable".into()));
                }
            }
            match op.as_str() {
                "$set" => set_path(doc, path, operand.clone())?,
                "$unset" => {
                    remove_path(doc, path);
                }
                "$inc" => {
                    let current = get_path(doc, path).cloned().unwrap_or(Value::from(0));
                    set_path(doc, path, add_numbers(&current, operand)?)?;
                }
                "$push" => {
                    let mut items = match get_path(doc, path) {
                        None | Some(Value::Null) => Vec::new(),
                        Some(Value::Array(items)) => items.clone(),
                        Some(other) => {
                            return Err(StoreError::InvalidUpdate(format!(
                                "$push target {path} is not an array: {other}"
                            )))
                        }
                    };
                    items.push(operand.clone());
                    set_path(doc, path, Value::Array(items))?;
                }
                "$min" | "$max" => {
                    let wanted = if op == "$min" {
                        Ordering::Less
                    } else {
                        Ordering::Greater
                    };
                    let replace = match get_path(doc, path) {
                        None => true,
                        Some(current) => compare_values(operand, current) == wanted,
                    };
                    if replace {
                        set_path(doc, path, operand.clone())?;
                    }
                }
                other => {
                    return Err(StoreError::InvalidUpdate(format!("unsupported operator {other}")))
                }
            }
        }
    }
    Ok(*doc != before)
}

fn add_numbers(current: &Value, delta: &Value) -> StoreResult<Value> {
    match (current, delta) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                Ok(Value::from(a + b))
            } else {
                let sum = a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0);
                Ok(Value::from(sum))
            }
        }
        _ => Err(StoreError::InvalidUpdate(format!(
            "$inc needs numbers, got {current} and {delta}"
        ))),
    }
}

/// Read the value at a dotted path without fanning out over arrays.
pub fn get_path<'a>(doc: &'a Record, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Write `value` at a dotted path, creating intermediate objects.
pub fn set_path(doc: &mut Record, path: &str, value: Value) -> StoreResult<()> {
    let segments: Vec<&str> = path.split('.').collect();
    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| StoreError::InvalidUpdate("empty path".into()))?;
    let mut current = doc;
    for segment in parents {
        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if slot.is_null() {
            *slot = Value::Object(Map::new());
        }
        current = match slot {
            Value::Object(map) => map,
            other => {
                return Err(StoreError::InvalidUpdate(format!(
                    "cannot create field in non-object {other} at {path}"
                )))
            }
        };
    }
    current.insert(last.to_string(), value);
    Ok(())
}

/// Remove the value at a dotted path. Returns `true` if something was removed.
pub fn remove_path(doc: &mut Record, path: &str) -> bool {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = segments.split_last() else {
        return false;
    };
    let mut current = doc;
    for segment in parents {
        match current.get_mut(*segment) {
            Some(Value::Object(map)) => current = map,
            _ => return false,
        }
    }
    current.remove(*last).is_some()
}
