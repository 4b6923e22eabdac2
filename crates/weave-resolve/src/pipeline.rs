//! Pipeline strategy: a [`LinkPlan`] compiled to `$lookup` joins.
//!
//! Each planned field becomes a join into a temporary `_link_<field>`
//! alias, followed by a stage that moves the result into the field and
//! drops the alias:
//!
//! - single link -- joined on `<field>.$id`, unwound with nulls preserved,
//!   and merged with `$ifNull` so a dangling reference keeps its stored
//!   form.
//! - link list -- joined on `<field>.$id`; the joined array replaces the
//!   field, in reference order, without dangling elements.
//! - back-link -- joined from `_id` to `<original_field>.$id` in the owner
//!   collection. Single back-links come back as arrays and are collapsed by
//!   [`collapse_back_links`] once the results are in memory.
//!
//! Child nodes become the nested `pipeline` of their parent's `$lookup`.

use serde_json::{json, Value};
use weave_types::{record_id, Record, ID_FIELD, REF_ID};

use crate::error::{ResolveError, ResolveResult};
use crate::plan::{LinkNode, LinkPlan};

/// Join stages resolving `nodes`.
pub fn link_stages(nodes: &[LinkNode]) -> Vec<Value> {
    let mut stages = Vec::new();
    for node in nodes {
        let alias = node.alias();
        let mut lookup = match node.kind.original_field() {
            Some(original) => json!({
                "from": node.target_collection,
                "localField": ID_FIELD,
                "foreignField": format!("{original}.{REF_ID}"),
                "as": alias,
            }),
            None => json!({
                "from": node.target_collection,
                "localField": format!("{}.{REF_ID}", node.field),
                "foreignField": ID_FIELD,
                "as": alias,
            }),
        };
        let nested = link_stages(&node.children);
        if !nested.is_empty() {
            lookup["pipeline"] = Value::Array(nested);
        }
        stages.push(json!({ "$lookup": lookup }));

        if node.is_back_link() || node.is_list() {
            stages.push(json!({ "$set": { node.field.as_str(): format!("${alias}") } }));
        } else {
            stages.push(json!({
                "$unwind": { "path": format!("${alias}"), "preserveNullAndEmptyArrays": true }
            }));
            stages.push(json!({
                "$set": { node.field.as_str(): { "$ifNull": [format!("${alias}"), format!("${}", node.field)] } }
            }));
        }
        stages.push(json!({ "$unset": alias }));
    }
    stages
}

/// Full pipeline for a query: joins first, then the filter, then any
/// caller-supplied stages.
///
/// Joining before matching lets the filter address fields of linked
/// documents (`door.height`).
pub fn build_pipeline(plan: &LinkPlan, filter: &Record, extra: &[Value]) -> Vec<Value> {
    let mut pipeline = link_stages(&plan.nodes);
    if !filter.is_empty() {
        pipeline.push(json!({ "$match": filter }));
    }
    pipeline.extend(extra.iter().cloned());
    pipeline
}

/// Turn joined single back-link arrays into their final shape: `null` when
/// nothing links back, the document when exactly one does.
///
/// # Errors
///
/// Returns [`ResolveError::BackLinkCardinality`] when more than one
/// document links back through a single back-link.
pub fn collapse_back_links(records: &mut [Record], nodes: &[LinkNode]) -> ResolveResult<()> {
    for record in records.iter_mut() {
        collapse_record(record, nodes)?;
    }
    Ok(())
}

fn collapse_record(record: &mut Record, nodes: &[LinkNode]) -> ResolveResult<()> {
    for node in nodes {
        if node.is_back_link() && !node.is_list() {
            if let Some(Value::Array(items)) = record.get(&node.field) {
                let collapsed = match items.len() {
                    0 => Value::Null,
                    1 => items[0].clone(),
                    found => {
                        return Err(ResolveError::BackLinkCardinality {
                            field: node.field.clone(),
                            id: record_id(record)?,
                            found,
                        })
                    }
                };
                record.insert(node.field.clone(), collapsed);
            }
        }
        if node.children.is_empty() {
            continue;
        }
        match record.get_mut(&node.field) {
            Some(Value::Object(inner)) => collapse_record(inner, &node.children)?,
            Some(Value::Array(items)) => {
                for item in items.iter_mut() {
                    if let Value::Object(inner) = item {
                        collapse_record(inner, &node.children)?;
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_schema::{Registry, SchemaBuilder};
    use weave_store::{DocumentStore, InMemoryDocumentStore};
    use weave_types::{DbRef, DocumentId};

    use crate::plan::DepthOptions;

    fn registry() -> Registry {
        Registry::builder()
            .register_schema(
                SchemaBuilder::new("House")
                    .field("name")
                    .link_to("door", "Door")
                    .link_list_to("windows", "Window")
                    .build(),
            )
            .register_schema(
                SchemaBuilder::new("Door")
                    .field("height")
                    .back_link_to("house", "House", "door")
                    .build(),
            )
            .register_schema(
                SchemaBuilder::new("Window")
                    .field("x")
                    .back_link_list_to("houses", "House", "windows")
                    .build(),
            )
            .build()
            .unwrap()
    }

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    fn seed(store: &InMemoryDocumentStore) -> (DocumentId, DocumentId, Vec<DocumentId>) {
        let house = DocumentId::new();
        let door = DocumentId::new();
        let windows = vec![DocumentId::new(), DocumentId::new()];
        store
            .insert_one("Door", record(json!({"_id": door, "height": 2})), None)
            .unwrap();
        for (x, id) in windows.iter().enumerate() {
            store
                .insert_one("Window", record(json!({"_id": id, "x": x})), None)
                .unwrap();
        }
        // Reversed reference order checks that the join keeps it.
        store
            .insert_one(
                "House",
                record(json!({
                    "_id": house,
                    "name": "test",
                    "door": DbRef::new("Door", door).to_value(),
                    "windows": [
                        DbRef::new("Window", windows[1]).to_value(),
                        DbRef::new("Window", windows[0]).to_value(),
                    ],
                })),
                None,
            )
            .unwrap();
        (house, door, windows)
    }

    #[test]
    fn stages_for_single_link() {
        let plan = LinkPlan::build(&registry(), "House", &DepthOptions::new().with_depth(1)).unwrap();
        let stages = link_stages(&plan.nodes);
        assert_eq!(
            stages[0],
            json!({"$lookup": {"from": "Door", "localField": "door.$id", "foreignField": "_id", "as": "_link_door"}})
        );
        assert_eq!(stages[1]["$unwind"]["preserveNullAndEmptyArrays"], json!(true));
        assert_eq!(stages[2]["$set"]["door"]["$ifNull"], json!(["$_link_door", "$door"]));
        assert_eq!(stages[3], json!({"$unset": "_link_door"}));
    }

    #[test]
    fn filter_follows_joins() {
        let plan = LinkPlan::build(&registry(), "House", &DepthOptions::new()).unwrap();
        let filter = record(json!({"door.height": 2}));
        let pipeline = build_pipeline(&plan, &filter, &[json!({"$limit": 1})]);
        let n = pipeline.len();
        assert_eq!(pipeline[n - 2], json!({"$match": {"door.height": 2}}));
        assert_eq!(pipeline[n - 1], json!({"$limit": 1}));

        let bare = build_pipeline(&LinkPlan::empty("House"), &Record::new(), &[]);
        assert!(bare.is_empty());
    }

    #[test]
    fn pipeline_resolves_links_in_order() {
        let store = InMemoryDocumentStore::new();
        let (_, door, windows) = seed(&store);
        let plan = LinkPlan::build(&registry(), "House", &DepthOptions::new().with_depth(1)).unwrap();
        let out = store
            .aggregate("House", &build_pipeline(&plan, &Record::new(), &[]), None)
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["door"]["_id"], json!(door));
        assert_eq!(out[0]["windows"][0]["_id"], json!(windows[1]));
        assert_eq!(out[0]["windows"][1]["_id"], json!(windows[0]));
        assert!(!out[0].contains_key("_link_door"));
    }

    #[test]
    fn dangling_single_link_keeps_reference() {
        let store = InMemoryDocumentStore::new();
        let missing = DbRef::new("Door", DocumentId::new()).to_value();
        store
            .insert_one("House", record(json!({"_id": DocumentId::new(), "door": missing.clone(), "windows": []})), None)
            .unwrap();
        let plan = LinkPlan::build(&registry(), "House", &DepthOptions::new().with_depth(1)).unwrap();
        let out = store
            .aggregate("House", &build_pipeline(&plan, &Record::new(), &[]), None)
            .unwrap();
        assert_eq!(out[0]["door"], missing);
    }

    #[test]
    fn back_links_collapse() {
        let store = InMemoryDocumentStore::new();
        let (house, door, _) = seed(&store);
        let plan = LinkPlan::build(&registry(), "Door", &DepthOptions::new().with_depth(1)).unwrap();
        let mut out = store
            .aggregate("Door", &build_pipeline(&plan, &Record::new(), &[]), None)
            .unwrap();
        collapse_back_links(&mut out, &plan.nodes).unwrap();
        assert_eq!(out[0]["_id"], json!(door));
        assert_eq!(out[0]["house"]["_id"], json!(house));

        let mut lonely = vec![record(json!({"_id": DocumentId::new(), "house": []}))];
        collapse_back_links(&mut lonely, &plan.nodes).unwrap();
        assert_eq!(lonely[0]["house"], Value::Null);
    }

    #[test]
    fn ambiguous_single_back_link_is_an_error() {
        let plan = LinkPlan::build(&registry(), "Door", &DepthOptions::new().with_depth(1)).unwrap();
        let mut out = vec![record(json!({"_id": DocumentId::new(), "house": [{"a": 1}, {"b": 2}]}))];
        let err = collapse_back_links(&mut out, &plan.nodes).unwrap_err();
        assert!(matches!(err, ResolveError::BackLinkCardinality { found: 2, .. }));
    }

    #[test]
    fn back_link_lists_stay_arrays() {
        let store = InMemoryDocumentStore::new();
        let (house, _, windows) = seed(&store);
        let plan = LinkPlan::build(&registry(), "Window", &DepthOptions::new().with_depth(1)).unwrap();
        let mut filter = Record::new();
        filter.insert("_id".into(), json!(windows[0]));
        let mut out = store
            .aggregate("Window", &build_pipeline(&plan, &filter, &[]), None)
            .unwrap();
        collapse_back_links(&mut out, &plan.nodes).unwrap();
        assert_eq!(out[0]["houses"].as_array().map(Vec::len), Some(1));
        assert_eq!(out[0]["houses"][0]["_id"], json!(house));
    }
}
