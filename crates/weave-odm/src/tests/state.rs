use serde_json::json;

use super::models::{Account, Door, House};
use super::setup;
use crate::{
    Findable, Identifiable, MergeStrategy, OdmError, StateChange, Update, WriteOptions, WriteRule,
};

fn saved_account(odm: &crate::Odm) -> Account {
    let accounts = odm.collection::<Account>().unwrap();
    let mut account = Account::new("ada", 100);
    accounts.insert(&mut account, WriteOptions::new()).unwrap();
    account
}

// ----------------------------------------------------------------
// Change detection
// ----------------------------------------------------------------

#[test]
fn saved_document_starts_unchanged() {
    let (_store, odm) = setup();
    let accounts = odm.collection::<Account>().unwrap();
    let mut account = saved_account(&odm);

    assert!(!accounts.is_changed(&account).unwrap());
    account.balance = 5;
    assert!(accounts.is_changed(&account).unwrap());

    let diff = accounts.get_changes(&account).unwrap();
    assert_eq!(diff.len(), 1);
    assert_eq!(diff.set_fields(), json!({"balance": 5}).as_object().cloned().unwrap());
}

#[test]
fn loaded_document_carries_its_state() {
    let (_store, odm) = setup();
    let accounts = odm.collection::<Account>().unwrap();
    let account = saved_account(&odm);

    let loaded = accounts.get(account.id().unwrap(), false).unwrap().unwrap();
    assert!(loaded.meta.saved_state.is_some());
    assert!(!accounts.is_changed(&loaded).unwrap());
}

#[test]
fn nested_changes_use_dotted_paths() {
    let (_store, odm) = setup();
    let accounts = odm.collection::<Account>().unwrap();
    let mut account = saved_account(&odm);

    account.profile["flags"]["beta"] = json!(true);
    let diff = accounts.get_changes(&account).unwrap();
    assert_eq!(diff.len(), 1);
    assert_eq!(diff.changes[0].path(), "profile.flags.beta");
}

#[test]
fn unsaved_document_has_no_state() {
    let (_store, odm) = setup();
    let accounts = odm.collection::<Account>().unwrap();

    let err = accounts.is_changed(&Account::new("new", 0)).unwrap_err();
    assert!(matches!(err, OdmError::StateNotSaved { .. }));
}

#[test]
fn untracked_model_rejects_state_queries() {
    let (_store, odm) = setup();
    let houses = odm.collection::<House>().unwrap();
    let mut house = House::new("a", Door::new(1));
    houses
        .insert(&mut house, WriteOptions::new().with_link_rule(WriteRule::Write))
        .unwrap();

    let err = houses.is_changed(&house).unwrap_err();
    assert!(matches!(err, OdmError::StateManagementDisabled { .. }));
    assert!(house.meta.saved_state.is_none());
}

// ----------------------------------------------------------------
// Partial saves
// ----------------------------------------------------------------

#[test]
fn save_changes_sends_only_the_diff() {
    let (store, odm) = setup();
    let accounts = odm.collection::<Account>().unwrap();
    let mut account = saved_account(&odm);
    let before = account.revision();

    account.balance = 42;
    store.reset_calls();
    assert!(accounts.save_changes(&mut account, WriteOptions::new()).unwrap());

    assert_eq!(store.count_calls("update_one", "accounts"), 1);
    assert_eq!(store.count_calls("replace_one", "accounts"), 0);
    let stored = &store.records("accounts")[0];
    assert_eq!(stored["balance"], json!(42));
    assert_eq!(stored["owner"], json!("ada"));
    assert_ne!(account.revision(), before);
    assert_eq!(stored["revision_id"], account.revision().unwrap().to_value());
    assert!(!accounts.is_changed(&account).unwrap());
}

#[test]
fn save_changes_without_changes_skips_the_store() {
    let (store, odm) = setup();
    let accounts = odm.collection::<Account>().unwrap();
    let mut account = saved_account(&odm);

    store.reset_calls();
    assert!(!accounts.save_changes(&mut account, WriteOptions::new()).unwrap());
    assert!(store.calls().is_empty());
}

#[test]
fn save_changes_detects_concurrent_writes() {
    let (_store, odm) = setup();
    let accounts = odm.collection::<Account>().unwrap();
    let mut account = saved_account(&odm);
    let mut stale = account.clone();

    account.balance = 1;
    accounts.save_changes(&mut account, WriteOptions::new()).unwrap();

    stale.balance = 2;
    let err = accounts.save_changes(&mut stale, WriteOptions::new()).unwrap_err();
    assert!(matches!(err, OdmError::RevisionConflict { .. }));

    accounts
        .save_changes(&mut stale, WriteOptions::new().ignoring_revision())
        .unwrap();
}

#[test]
fn previous_changes_reflect_the_last_save() {
    let (_store, odm) = setup();
    let accounts = odm.collection::<Account>().unwrap();
    let mut account = saved_account(&odm);

    assert!(accounts.previous_changes(&account).unwrap().is_empty());
    assert!(!accounts.has_changed(&account).unwrap());

    account.owner = "grace".into();
    accounts.save_changes(&mut account, WriteOptions::new()).unwrap();

    let previous = accounts.previous_changes(&account).unwrap();
    assert!(previous.changes.iter().any(|c| matches!(
        c,
        StateChange::Modified { path, new, .. } if path == "owner" && new == &json!("grace")
    )));
    assert!(accounts.has_changed(&account).unwrap());
}

#[test]
fn update_refreshes_state() {
    let (_store, odm) = setup();
    let accounts = odm.collection::<Account>().unwrap();
    let mut account = saved_account(&odm);

    accounts
        .update(&mut account, Update::new().inc("balance", 10), WriteOptions::new())
        .unwrap();
    assert_eq!(account.balance, 110);
    assert!(!accounts.is_changed(&account).unwrap());
}

#[test]
fn rollback_restores_saved_state() {
    let (_store, odm) = setup();
    let accounts = odm.collection::<Account>().unwrap();
    let mut account = saved_account(&odm);
    let id = account.id();

    account.balance = -1;
    account.owner = "mallory".into();
    accounts.rollback(&mut account).unwrap();

    assert_eq!(account.balance, 100);
    assert_eq!(account.owner, "ada");
    assert_eq!(account.id(), id);
    assert!(account.meta.saved_state.is_some());
}

// ----------------------------------------------------------------
// Sync
// ----------------------------------------------------------------

#[test]
fn sync_remote_takes_the_stored_document() {
    let (_store, odm) = setup();
    let accounts = odm.collection::<Account>().unwrap();
    let mut account = saved_account(&odm);
    let mut copy = accounts.get(account.id().unwrap(), false).unwrap().unwrap();
    copy.owner = "grace".into();

    account.balance = 100_000;
    accounts.save(&mut account, WriteOptions::new()).unwrap();

    accounts.sync(&mut copy, MergeStrategy::Remote, None).unwrap();
    assert_eq!(copy.owner, "ada");
    assert_eq!(copy.balance, 100_000);
    assert_eq!(copy.revision(), account.revision());
    assert!(!accounts.is_changed(&copy).unwrap());
}

#[test]
fn sync_local_replays_edits_onto_the_stored_document() {
    let (_store, odm) = setup();
    let accounts = odm.collection::<Account>().unwrap();
    let mut account = saved_account(&odm);
    let mut copy = accounts.get(account.id().unwrap(), false).unwrap().unwrap();
    copy.owner = "grace".into();
    copy.profile["flags"]["beta"] = json!(true);

    account.balance = 100_000;
    account.profile["tier"] = json!("gold");
    accounts.save(&mut account, WriteOptions::new()).unwrap();

    accounts.sync(&mut copy, MergeStrategy::Local, None).unwrap();
    assert_eq!(copy.owner, "grace");
    assert_eq!(copy.balance, 100_000);
    assert_eq!(copy.profile, json!({"tier": "gold", "flags": {"beta": true}}));
    assert_eq!(copy.revision(), account.revision());

    let pending = accounts.get_changes(&copy).unwrap();
    assert_eq!(pending.len(), 2);
    accounts.save_changes(&mut copy, WriteOptions::new()).unwrap();
}

#[test]
fn sync_local_fails_when_the_edit_no_longer_fits() {
    let (_store, odm) = setup();
    let accounts = odm.collection::<Account>().unwrap();
    let mut account = saved_account(&odm);
    let mut copy = accounts.get(account.id().unwrap(), false).unwrap().unwrap();
    copy.profile["flags"]["beta"] = json!({"since": 2024});

    account.profile = json!({"flags": "nothing"});
    accounts.save(&mut account, WriteOptions::new()).unwrap();

    let err = accounts.sync(&mut copy, MergeStrategy::Local, None).unwrap_err();
    assert!(matches!(err, OdmError::ApplyChanges { ref path } if path == "profile.flags.beta"));
    assert_eq!(copy.profile["flags"]["beta"], json!({"since": 2024}));
}

#[test]
fn sync_keeps_fetched_links_that_still_match() {
    let (_store, odm) = setup();
    let houses = odm.collection::<House>().unwrap();
    let mut house = House::new("a", Door::new(1));
    houses
        .insert(&mut house, WriteOptions::new().with_link_rule(WriteRule::Write))
        .unwrap();
    let mut other = houses.get(house.id().unwrap(), false).unwrap().unwrap();
    other.name = "b".into();
    houses.save(&mut other, WriteOptions::new()).unwrap();

    houses.sync(&mut house, MergeStrategy::Remote, None).unwrap();
    assert_eq!(house.name, "b");
    assert_eq!(house.door().height, 1);
}

#[test]
fn sync_of_a_deleted_document_is_not_found() {
    let (_store, odm) = setup();
    let accounts = odm.collection::<Account>().unwrap();
    let mut account = saved_account(&odm);
    accounts.delete(&account, crate::DeleteOptions::new()).unwrap();

    let err = accounts.sync(&mut account, MergeStrategy::Remote, None).unwrap_err();
    assert!(matches!(err, OdmError::DocumentNotFound { .. }));
}
