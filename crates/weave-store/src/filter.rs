//! Filter evaluation for the in-memory store.
//!
//! Supported: implicit equality, `$eq $ne $gt $gte $lt $lte $in $nin
//! $exists $not`, and the logical `$and $or $nor`. Dotted paths traverse
//! nested objects and fan out over arrays; a condition on a path matches
//! when any reachable value satisfies it.

use std::cmp::Ordering;

use serde_json::Value;
use weave_types::Record;

use crate::error::{StoreError, StoreResult};

/// Returns `true` if `doc` satisfies `filter`.
pub fn matches(doc: &Record, filter: &Record) -> StoreResult<bool> {
    for (key, condition) in filter {
        let ok = match key.as_str() {
            "$and" => each_clause(condition)?
                .iter()
                .map(|clause| matches(doc, clause))
                .collect::<StoreResult<Vec<_>>>()?
                .into_iter()
                .all(|b| b),
            "$or" => each_clause(condition)?
                .iter()
                .map(|clause| matches(doc, clause))
                .collect::<StoreResult<Vec<_>>>()?
                .into_iter()
                .any(|b| b),
            "$nor" => !each_clause(condition)?
                .iter()
                .map(|clause| matches(doc, clause))
                .collect::<StoreResult<Vec<_>>>()?
                .into_iter()
                .any(|b| b),
            op if op.starts_with('$') => {
                return Err(StoreError::InvalidFilter(format!("unsupported top-level operator {op}")))
            }
            path => field_matches(doc, path, condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn each_clause(condition: &Value) -> StoreResult<Vec<&Record>> {
    let clauses = condition
        .as_array()
        .ok_or_else(|| StoreError::InvalidFilter("logical operator expects an array".into()))?;
    clauses
        .iter()
        .map(|c| {
            c.as_object()
                .ok_or_else(|| StoreError::InvalidFilter(format!("clause is not a document: {c}")))
        })
        .collect()
}

fn is_operator_doc(value: &Value) -> bool {
    match value {
        Value::Object(map) => !map.is_empty() && map.keys().all(|k| k.starts_with('$')),
        _ => false,
    }
}

fn field_matches(doc: &Record, path: &str, condition: &Value) -> StoreResult<bool> {
    let found = record_path_values(doc, path);
    match condition {
        Value::Object(ops) if is_operator_doc(condition) => {
            for (op, operand) in ops {
                if !operator_matches(&found, op, operand)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        _ => Ok(equals_any(&found, condition)),
    }
}

fn operator_matches(found: &[&Value], op: &str, operand: &Value) -> StoreResult<bool> {
    let result = match op {
        "$eq" => equals_any(found, operand),
        "$ne" => !equals_any(found, operand),
        "$gt" => compare_any(found, operand, |o| o == Ordering::Greater),
        "$gte" => compare_any(found, operand, |o| o != Ordering::Less),
        "$lt" => compare_any(found, operand, |o| o == Ordering::Less),
        "$lte" => compare_any(found, operand, |o| o != Ordering::Greater),
        "$in" => in_list(found, operand)?,
        "$nin" => !in_list(found, operand)?,
        "$exists" => {
            let wanted = operand.as_bool().unwrap_or(true);
            !found.is_empty() == wanted
        }
        "$not" => {
            let Value::Object(inner) = operand else {
                return Err(StoreError::InvalidFilter("$not expects an operator document".into()));
            };
            let mut all = true;
            for (inner_op, inner_operand) in inner {
                all &= operator_matches(found, inner_op, inner_operand)?;
            }
            !all
        }
        other => return Err(StoreError::InvalidFilter(format!("unsupported operator {other}"))),
    };
    Ok(result)
}

fn in_list(found: &[&Value], operand: &Value) -> StoreResult<bool> {
    let list = operand
        .as_array()
        .ok_or_else(|| StoreError::InvalidFilter("$in/$nin expects an array".into()))?;
    Ok(list.iter().any(|candidate| equals_any(found, candidate)))
}

/// Equality with array fan-out; a missing field equals `null`.
fn equals_any(found: &[&Value], expected: &Value) -> bool {
    if found.is_empty() {
        return expected.is_null();
    }
    found.iter().any(|value| {
        values_equal(value, expected)
            || matches!(value, Value::Array(items) if items.iter().any(|i| values_equal(i, expected)))
    })
}

fn compare_any(found: &[&Value], operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    let rank = type_rank(operand);
    let scalar = |v: &Value| type_rank(v) == rank && accept(compare_values(v, operand));
    found.iter().any(|value| match value {
        Value::Array(items) => items.iter().any(scalar),
        other => scalar(other),
    })
}

/// Collect every value reachable through a dotted path.
///
/// Arrays encountered mid-path fan out over their object elements; a
/// numeric segment also indexes into the array. The final value is returned
/// as-is (arrays are not flattened).
pub fn path_values<'a>(value: &'a Value, path: &str) -> Vec<&'a Value> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    collect(value, &segments, &mut out);
    out
}

fn collect<'a>(value: &'a Value, segments: &[&str], out: &mut Vec<&'a Value>) {
    let Some((head, rest)) = segments.split_first() else {
        out.push(value);
        return;
    };
    match value {
        Value::Object(map) => {
            if let Some(next) = map.get(*head) {
                collect(next, rest, out);
            }
        }
        Value::Array(items) => {
            if let Ok(index) = head.parse::<usize>() {
                if let Some(next) = items.get(index) {
                    collect(next, rest, out);
                }
            }
            for item in items.iter().filter(|i| i.is_object()) {
                collect(item, segments, out);
            }
        }
        _ => {}
    }
}

/// [`path_values`] rooted at a record.
pub fn record_path_values<'a>(doc: &'a Record, path: &str) -> Vec<&'a Value> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    if let Some((head, rest)) = segments.split_first() {
        if let Some(value) = doc.get(*head) {
            collect(value, rest, &mut out);
        }
    }
    out
}

/// Values reachable through `path` with trailing arrays flattened, in
/// document order. Used for join keys.
pub fn path_keys(value: &Value, path: &str) -> Vec<Value> {
    let mut keys = Vec::new();
    for found in path_values(value, path) {
        match found {
            Value::Array(items) => keys.extend(items.iter().cloned()),
            other => keys.push(other.clone()),
        }
    }
    keys
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// Total order over values: by type bracket first, then by value.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    let by_rank = type_rank(a).cmp(&type_rank(b));
    if by_rank != Ordering::Equal {
        return by_rank;
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let o = compare_values(l, r);
                if o != Ordering::Equal {
                    return o;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            for ((lk, lv), (rk, rv)) in x.iter().zip(y.iter()) {
                let o = lk.cmp(rk).then_with(|| compare_values(lv, rv));
                if o != Ordering::Equal {
                    return o;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => Ordering::Equal,
    }
}

/// Structural equality that treats `1` and `1.0` as equal.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    compare_values(a, b) == Ordering::Equal
}
