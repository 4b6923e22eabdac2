//! Aggregation pipeline evaluation for the in-memory store.
//!
//! Supported stages: `$match`, `$lookup` (equality join with an optional
//! nested pipeline), `$unwind`, `$set`/`$addFields`, `$unset`, `$project`,
//! `$sort`, `$skip`, `$limit`, `$count` and `$group` (`$sum`, `$first`,
//! `$push`). Expressions: `"$field.path"`, literals, `$ifNull`, `$literal`
//! and `$size`.

use std::cmp::Ordering;

use serde_json::{Map, Value};
use weave_types::{Record, ID_FIELD};

use crate::error::{StoreError, StoreResult};
use crate::filter::{compare_values, matches, path_keys, values_equal};
use crate::update::{get_path, remove_path, set_path};

/// Source of foreign collections for `$lookup`.
pub type CollectionSource<'a> = &'a dyn Fn(&str) -> Vec<Record>;

/// Run `pipeline` over `docs`.
pub fn run_pipeline(
    mut docs: Vec<Record>,
    pipeline: &[Value],
    source: CollectionSource<'_>,
) -> StoreResult<Vec<Record>> {
    for stage in pipeline {
        let (name, spec) = stage_parts(stage)?;
        docs = match name {
            "$match" => {
                let filter = as_document(spec, name)?;
                let mut kept = Vec::with_capacity(docs.len());
                for doc in docs {
                    if matches(&doc, filter)? {
                        kept.push(doc);
                    }
                }
                kept
            }
            "$lookup" => lookup(docs, as_document(spec, name)?, source)?,
            "$unwind" => unwind(docs, spec)?,
            "$set" | "$addFields" => {
                let fields = as_document(spec, name)?;
                docs.into_iter()
                    .map(|mut doc| {
                        for (path, expr) in fields {
                            match eval_expr(&doc, expr)? {
                                Some(value) => set_path(&mut doc, path, value)?,
                                None => {
                                    remove_path(&mut doc, path);
                                }
                            }
                        }
                        Ok(doc)
                    })
                    .collect::<StoreResult<Vec<_>>>()?
            }
            "$unset" => {
                let paths: Vec<&str> = match spec {
                    Value::String(path) => vec![path.as_str()],
                    Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
                    other => {
                        return Err(StoreError::InvalidPipeline(format!("bad $unset: {other}")))
                    }
                };
                docs.into_iter()
                    .map(|mut doc| {
                        for path in &paths {
                            remove_path(&mut doc, path);
                        }
                        doc
                    })
                    .collect()
            }
            "$project" => {
                let projection = as_document(spec, name)?;
                docs.into_iter()
                    .map(|doc| project(&doc, projection))
                    .collect::<StoreResult<Vec<_>>>()?
            }
            "$sort" => {
                let keys = sort_keys(as_document(spec, name)?)?;
                sort_records(&mut docs, &keys);
                docs
            }
            "$skip" => {
                let n = as_count(spec, name)?;
                docs.into_iter().skip(n).collect()
            }
            "$limit" => {
                let n = as_count(spec, name)?;
                docs.into_iter().take(n).collect()
            }
            "$count" => {
                let field = spec
                    .as_str()
                    .ok_or_else(|| StoreError::InvalidPipeline("$count expects a field name".into()))?;
                if docs.is_empty() {
                    Vec::new()
                } else {
                    let mut out = Record::new();
                    out.insert(field.to_string(), Value::from(docs.len() as u64));
                    vec![out]
                }
            }
            "$group" => group(docs, as_document(spec, name)?)?,
            other => {
                return Err(StoreError::InvalidPipeline(format!("unsupported stage {other}")))
            }
        };
    }
    Ok(docs)
}

fn stage_parts(stage: &Value) -> StoreResult<(&str, &Value)> {
    match stage {
        Value::Object(map) if map.len() == 1 => {
            let (name, spec) = map
                .iter()
                .next()
                .ok_or_else(|| StoreError::InvalidPipeline("empty stage".into()))?;
            Ok((name.as_str(), spec))
        }
        other => Err(StoreError::InvalidPipeline(format!(
            "stage must have exactly one key: {other}"
        ))),
    }
}

fn as_document<'a>(spec: &'a Value, stage: &str) -> StoreResult<&'a Record> {
    spec.as_object()
        .ok_or_else(|| StoreError::InvalidPipeline(format!("{stage} expects a document")))
}

fn as_count(spec: &Value, stage: &str) -> StoreResult<usize> {
    spec.as_u64()
        .map(|n| n as usize)
        .ok_or_else(|| StoreError::InvalidPipeline(format!("{stage} expects a non-negative integer")))
}

fn str_field<'a>(spec: &'a Record, key: &str) -> StoreResult<&'a str> {
    spec.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::InvalidPipeline(format!("$lookup needs `{key}`")))
}

// ---------------------------------------------------------------------------
// $lookup
// ---------------------------------------------------------------------------

fn lookup(docs: Vec<Record>, spec: &Record, source: CollectionSource<'_>) -> StoreResult<Vec<Record>> {
    let from = str_field(spec, "from")?;
    let local_field = str_field(spec, "localField")?;
    let foreign_field = str_field(spec, "foreignField")?;
    let as_field = str_field(spec, "as")?;
    let nested: &[Value] = match spec.get("pipeline") {
        None => &[],
        Some(Value::Array(stages)) => stages,
        Some(other) => {
            return Err(StoreError::InvalidPipeline(format!("bad $lookup pipeline: {other}")))
        }
    };

    let foreign = source(from);
    let foreign_keys: Vec<Vec<Value>> = foreign
        .iter()
        .map(|f| {
            let keys = path_keys(&Value::Object(f.clone()), foreign_field);
            if keys.is_empty() {
                vec![Value::Null]
            } else {
                keys
            }
        })
        .collect();

    let mut out = Vec::with_capacity(docs.len());
    for mut doc in docs {
        let mut local_keys = path_keys(&Value::Object(doc.clone()), local_field);
        if local_keys.is_empty() {
            local_keys.push(Value::Null);
        }
        // Emit matches in local-key order, each foreign record once.
        let mut taken = vec![false; foreign.len()];
        let mut joined = Vec::new();
        for key in &local_keys {
            for (index, keys) in foreign_keys.iter().enumerate() {
                if !taken[index] && keys.iter().any(|k| values_equal(k, key)) {
                    taken[index] = true;
                    joined.push(foreign[index].clone());
                }
            }
        }
        let joined = if nested.is_empty() {
            joined
        } else {
            run_pipeline(joined, nested, source)?
        };
        set_path(
            &mut doc,
            as_field,
            Value::Array(joined.into_iter().map(Value::Object).collect()),
        )?;
        out.push(doc);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// $unwind
// ---------------------------------------------------------------------------

fn unwind(docs: Vec<Record>, spec: &Value) -> StoreResult<Vec<Record>> {
    let (path, preserve) = match spec {
        Value::String(path) => (path.as_str(), false),
        Value::Object(map) => (
            map.get("path").and_then(Value::as_str).ok_or_else(|| {
                StoreError::InvalidPipeline("$unwind needs `path`".into())
            })?,
            map.get("preserveNullAndEmptyArrays")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        ),
        other => return Err(StoreError::InvalidPipeline(format!("bad $unwind: {other}"))),
    };
    let path = path
        .strip_prefix('$')
        .ok_or_else(|| StoreError::InvalidPipeline("$unwind path must start with `$`".into()))?;

    let mut out = Vec::new();
    for doc in docs {
        match get_path(&doc, path).cloned() {
            Some(Value::Array(items)) if !items.is_empty() => {
                for item in items {
                    let mut copy = doc.clone();
                    set_path(&mut copy, path, item)?;
                    out.push(copy);
                }
            }
            Some(Value::Array(_)) => {
                if preserve {
                    let mut copy = doc;
                    remove_path(&mut copy, path);
                    out.push(copy);
                }
            }
            None | Some(Value::Null) => {
                if preserve {
                    out.push(doc);
                }
            }
            Some(_) => out.push(doc),
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// $project / $sort / $group
// ---------------------------------------------------------------------------

fn is_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        _ => None,
    }
}

/// Apply a `$project` specification to one record.
pub fn project(doc: &Record, projection: &Record) -> StoreResult<Record> {
    let inclusive = projection
        .iter()
        .filter(|(k, _)| k.as_str() != ID_FIELD)
        .any(|(_, v)| is_flag(v) != Some(false));

    if !inclusive {
        let mut out = doc.clone();
        for (path, flag) in projection {
            if is_flag(flag) == Some(false) {
                remove_path(&mut out, path);
            }
        }
        return Ok(out);
    }

    let mut out = Record::new();
    if projection.get(ID_FIELD).and_then(is_flag) != Some(false) {
        if let Some(id) = doc.get(ID_FIELD) {
            out.insert(ID_FIELD.into(), id.clone());
        }
    }
    for (path, spec) in projection {
        if path == ID_FIELD {
            continue;
        }
        match is_flag(spec) {
            Some(true) => {
                if let Some(value) = get_path(doc, path) {
                    set_path(&mut out, path, value.clone())?;
                }
            }
            Some(false) => {}
            None => {
                if let Some(value) = eval_expr(doc, spec)? {
                    set_path(&mut out, path, value)?;
                }
            }
        }
    }
    Ok(out)
}

fn sort_keys(spec: &Record) -> StoreResult<Vec<(String, bool)>> {
    spec.iter()
        .map(|(field, direction)| match direction.as_i64() {
            Some(1) => Ok((field.clone(), true)),
            Some(-1) => Ok((field.clone(), false)),
            _ => Err(StoreError::InvalidPipeline(format!(
                "sort direction for {field} must be 1 or -1"
            ))),
        })
        .collect()
}

/// Stable sort of records by `(path, ascending)` keys; missing sorts as null.
pub fn sort_records(docs: &mut [Record], keys: &[(String, bool)]) {
    docs.sort_by(|a, b| {
        for (path, ascending) in keys {
            let left = get_path(a, path).unwrap_or(&Value::Null);
            let right = get_path(b, path).unwrap_or(&Value::Null);
            let ordering = compare_values(left, right);
            let ordering = if *ascending { ordering } else { ordering.reverse() };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn group(docs: Vec<Record>, spec: &Record) -> StoreResult<Vec<Record>> {
    let key_expr = spec
        .get(ID_FIELD)
        .ok_or_else(|| StoreError::InvalidPipeline("$group needs `_id`".into()))?;
    let mut groups: Vec<(Value, Vec<Record>)> = Vec::new();
    for doc in docs {
        let key = eval_expr(&doc, key_expr)?.unwrap_or(Value::Null);
        match groups.iter_mut().find(|(k, _)| values_equal(k, &key)) {
            Some((_, members)) => members.push(doc),
            None => groups.push((key, vec![doc])),
        }
    }

    let mut out = Vec::with_capacity(groups.len());
    for (key, members) in groups {
        let mut result = Record::new();
        result.insert(ID_FIELD.into(), key);
        for (field, accumulator) in spec.iter().filter(|(k, _)| k.as_str() != ID_FIELD) {
            let (op, expr) = accumulator
                .as_object()
                .and_then(|m| m.iter().next())
                .ok_or_else(|| StoreError::InvalidPipeline(format!("bad accumulator for {field}")))?;
            let value = match op.as_str() {
                "$sum" => {
                    let mut total = 0f64;
                    let mut integral = true;
                    for member in &members {
                        if let Some(Value::Number(n)) = eval_expr(member, expr)? {
                            integral &= n.is_i64();
                            total += n.as_f64().unwrap_or(0.0);
                        }
                    }
                    if integral {
                        Value::from(total as i64)
                    } else {
                        Value::from(total)
                    }
                }
                "$first" => match members.first() {
                    Some(member) => eval_expr(member, expr)?.unwrap_or(Value::Null),
                    None => Value::Null,
                },
                "$push" => Value::Array(
                    members
                        .iter()
                        .map(|m| eval_expr(m, expr).map(|v| v.unwrap_or(Value::Null)))
                        .collect::<StoreResult<Vec<_>>>()?,
                ),
                other => {
                    return Err(StoreError::InvalidPipeline(format!(
                        "unsupported accumulator {other}"
                    )))
                }
            };
            result.insert(field.clone(), value);
        }
        out.push(result);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

/// Evaluate an aggregation expression against `doc`.
///
/// Returns `Ok(None)` when the expression refers to a missing field.
pub fn eval_expr(doc: &Record, expr: &Value) -> StoreResult<Option<Value>> {
    match expr {
        Value::String(s) if s.starts_with('$') && !s.starts_with("$$") => {
            Ok(field_expr(doc, &s[1..]))
        }
        Value::Object(map) if map.len() == 1 && map.keys().all(|k| k.starts_with('$')) => {
            let (op, args) = map
                .iter()
                .next()
                .ok_or_else(|| StoreError::InvalidPipeline("empty expression".into()))?;
            operator_expr(doc, op, args)
        }
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, value) in map {
                if let Some(value) = eval_expr(doc, value)? {
                    out.insert(key.clone(), value);
                }
            }
            Ok(Some(Value::Object(out)))
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval_expr(doc, item)?.unwrap_or(Value::Null));
            }
            Ok(Some(Value::Array(out)))
        }
        literal => Ok(Some(literal.clone())),
    }
}

fn field_expr(doc: &Record, path: &str) -> Option<Value> {
    let mut segments = path.split('.');
    let first = doc.get(segments.next()?)?.clone();
    segments.try_fold(first, |current, segment| match current {
        Value::Object(mut map) => map.remove(segment),
        Value::Array(items) => Some(Value::Array(
            items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(mut map) => map.remove(segment),
                    _ => None,
                })
                .collect(),
        )),
        _ => None,
    })
}

fn operator_expr(doc: &Record, op: &str, args: &Value) -> StoreResult<Option<Value>> {
    match op {
        "$literal" => Ok(Some(args.clone())),
        "$ifNull" => {
            let items = args
                .as_array()
                .ok_or_else(|| StoreError::InvalidPipeline("$ifNull expects an array".into()))?;
            let Some((fallback, candidates)) = items.split_last() else {
                return Ok(None);
            };
            for candidate in candidates {
                match eval_expr(doc, candidate)? {
                    None | Some(Value::Null) => continue,
                    found => return Ok(found),
                }
            }
            eval_expr(doc, fallback)
        }
        "$size" => match eval_expr(doc, args)? {
            Some(Value::Array(items)) => Ok(Some(Value::from(items.len() as u64))),
            other => Err(StoreError::InvalidPipeline(format!(
                "$size expects an array, got {other:?}"
            ))),
        },
        other => Err(StoreError::InvalidPipeline(format!("unsupported expression {other}"))),
    }
}
