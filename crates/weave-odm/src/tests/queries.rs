use serde::Deserialize;
use serde_json::json;

use super::models::{Door, House, Window};
use super::setup;
use crate::{and, field, or, Aggregatable, Findable, Odm, Sort, Update, WriteOptions, WriteRule};

fn windows(odm: &Odm, xs: &[i64]) {
    let windows = odm.collection::<Window>().unwrap();
    let mut batch: Vec<Window> = xs.iter().copied().map(Window::new).collect();
    windows.insert_many(&mut batch, WriteOptions::new()).unwrap();
}

fn houses(odm: &Odm, doors: &[(&str, i64)]) {
    let houses = odm.collection::<House>().unwrap();
    for (name, height) in doors {
        let mut house = House::new(name, Door::new(*height));
        houses
            .insert(&mut house, WriteOptions::new().with_link_rule(WriteRule::Write))
            .unwrap();
    }
}

fn xs(found: &[Window]) -> Vec<i64> {
    found.iter().map(|w| w.x).collect()
}

// ----------------------------------------------------------------
// Find
// ----------------------------------------------------------------

#[test]
fn sort_skip_and_limit() {
    let (_store, odm) = setup();
    windows(&odm, &[3, 1, 5, 2, 4]);
    let collection = odm.collection::<Window>().unwrap();

    let found = collection
        .find(field("x").gte(2))
        .sort(Sort::new().desc("x"))
        .skip(1)
        .limit(2)
        .to_list()
        .unwrap();
    assert_eq!(xs(&found), vec![4, 3]);
}

#[test]
fn combined_conditions() {
    let (_store, odm) = setup();
    windows(&odm, &[1, 2, 3, 4, 5]);
    let collection = odm.collection::<Window>().unwrap();

    let found = collection
        .find(or([field("x").lt(2), field("x").gt(4)]))
        .sort(Sort::parse("x"))
        .to_list()
        .unwrap();
    assert_eq!(xs(&found), vec![1, 5]);

    let found = collection
        .find(and([field("x").gt(1), field("x").lt(4)]))
        .filter(field("x").ne(2))
        .to_list()
        .unwrap();
    assert_eq!(xs(&found), vec![3]);
}

#[test]
fn first_on_no_match_is_none() {
    let (_store, odm) = setup();
    windows(&odm, &[1]);
    let collection = odm.collection::<Window>().unwrap();

    assert!(collection.find_one(field("x").eq(9)).first().unwrap().is_none());
    assert_eq!(collection.find_one(field("x").eq(1)).first().unwrap().unwrap().x, 1);
}

#[test]
fn counts() {
    let (_store, odm) = setup();
    windows(&odm, &[1, 2, 3, 4, 5]);
    houses(&odm, &[("tall", 10), ("short", 2)]);
    let collection = odm.collection::<Window>().unwrap();

    assert_eq!(collection.count().unwrap(), 5);
    assert_eq!(collection.find(field("x").gt(3)).limit(1).count().unwrap(), 2);

    let houses = odm.collection::<House>().unwrap();
    let tall = houses.find(field("door.height").gt(5)).fetch_links(true);
    assert_eq!(tall.count().unwrap(), 1);
}

// ----------------------------------------------------------------
// Multi-document writes
// ----------------------------------------------------------------

#[test]
fn update_and_delete_matching_documents() {
    let (store, odm) = setup();
    windows(&odm, &[1, 2, 3]);
    let collection = odm.collection::<Window>().unwrap();

    let updated = collection
        .find(field("x").lt(3))
        .update(Update::new().inc("x", 10))
        .unwrap();
    assert_eq!(updated.modified, 2);

    let deleted = collection.find(field("x").gt(10)).delete().unwrap();
    assert_eq!(deleted.deleted, 2);
    assert_eq!(store.len("windows"), 1);
}

#[test]
fn update_through_linked_filter() {
    let (store, odm) = setup();
    houses(&odm, &[("tall", 10), ("short", 2)]);
    let collection = odm.collection::<House>().unwrap();

    let updated = collection
        .find(field("door.height").gt(5))
        .fetch_links(true)
        .update(Update::new().set("name", "towering"))
        .unwrap();
    assert_eq!(updated.matched, 1);

    let mut names: Vec<String> = store
        .records("houses")
        .iter()
        .map(|r| r["name"].as_str().unwrap().to_string())
        .collect();
    names.sort();
    assert_eq!(names, vec!["short", "towering"]);
}

// ----------------------------------------------------------------
// Aggregation
// ----------------------------------------------------------------

#[derive(Debug, Deserialize, PartialEq)]
struct Total {
    total: i64,
}

#[test]
fn aggregate_after_the_query_stages() {
    let (_store, odm) = setup();
    windows(&odm, &[1, 2, 3, 4]);
    let collection = odm.collection::<Window>().unwrap();

    let totals: Vec<Total> = collection
        .find(field("x").gt(1))
        .aggregate_as(&[json!({"$group": {"_id": null, "total": {"$sum": "$x"}}})])
        .unwrap();
    assert_eq!(totals, vec![Total { total: 9 }]);

    let raw = Aggregatable::aggregate(&collection, &[json!({"$count": "n"})]).unwrap();
    assert_eq!(raw[0]["n"], json!(4));
}

#[test]
fn pipeline_without_links_is_a_plain_match() {
    let (_store, odm) = setup();
    let collection = odm.collection::<Window>().unwrap();

    let pipeline = collection
        .find(field("x").gt(1))
        .sort(Sort::new().asc("x"))
        .limit(3)
        .pipeline(&[])
        .unwrap();
    assert_eq!(
        pipeline,
        vec![
            json!({"$match": {"x": {"$gt": 1}}}),
            json!({"$sort": {"x": 1}}),
            json!({"$limit": 3}),
        ]
    );
}

#[test]
fn pipeline_with_links_joins_before_matching() {
    let (_store, odm) = setup();
    let collection = odm.collection::<House>().unwrap();

    let pipeline = collection
        .find(field("door.height").gt(1))
        .fetch_links(true)
        .nesting_depth(1)
        .pipeline(&[])
        .unwrap();
    let lookups = pipeline.iter().filter(|s| s.get("$lookup").is_some()).count();
    assert_eq!(lookups, 2);
    assert_eq!(pipeline.last().unwrap(), &json!({"$match": {"door.height": {"$gt": 1}}}));
}
