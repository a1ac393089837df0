//! Integration tests for the sled store coordinator behind a context stack

use super::test_utils::{initialized_registry, temp_store};
use ctxstack::config::StoreConfig;
use ctxstack::confinement::run_loop;
use ctxstack::context::{ChangeSet, ObjectChange};
use ctxstack::{
    AttributeValue, Attributes, ContextError, ContextRegistry, MergePolicy, ObjectId,
    SledStoreCoordinator, StorageError, StoreCoordinator,
};
use std::sync::Arc;
use std::time::Duration;

fn insert_change(name: &str) -> ObjectChange {
    let values = Attributes::from([("name".to_string(), AttributeValue::from(name))]);
    ObjectChange {
        id: ObjectId::temporary(),
        entity: "Person".to_string(),
        changed: values.clone(),
        values,
        base_version: 0,
    }
}

#[test]
fn test_fresh_stack_faults_persisted_objects() {
    let (_dir, store, registry) = initialized_registry();
    let default = registry.default_context().unwrap();

    let id = default
        .perform_and_wait(|ctx| -> Result<ObjectId, ContextError> {
            let id = ctx.insert_object("Person", Attributes::new())?;
            ctx.set_value(&id, "name", "kept")?;
            Ok(ctx.save_to_store()?.event().unwrap().inserted[0].id)
        })
        .unwrap()
        .unwrap();
    run_loop::run_pending();
    registry.clean_up();
    store.flush().unwrap();

    let second = ContextRegistry::new();
    second.initialize_stack(store.clone()).unwrap();
    let fresh_default = second.default_context().unwrap();
    let seen = fresh_default
        .perform_and_wait(move |ctx| ctx.object(&id))
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(seen.get("name"), Some(&AttributeValue::from("kept")));
    assert_eq!(seen.version, 1);
    assert_eq!(store.attached_contexts().len(), 2);

    second.clean_up();
}

#[test]
fn test_persist_assigns_distinct_permanent_ids() {
    let (_dir, store) = temp_store();
    let changes = ChangeSet {
        inserted: vec![insert_change("a"), insert_change("b")],
        ..Default::default()
    };

    let receipt = store.persist(&changes, MergePolicy::Error).unwrap();
    assert_eq!(receipt.assigned.len(), 2);
    assert_eq!(receipt.inserted.len(), 2);
    assert_ne!(receipt.inserted[0].id, receipt.inserted[1].id);
    assert!(receipt.inserted.iter().all(|s| !s.id.is_temporary()));
    assert_eq!(store.len(), 2);
}

#[test]
fn test_stale_update_conflicts_under_error_policy() {
    let (_dir, store) = temp_store();
    let receipt = store
        .persist(
            &ChangeSet {
                inserted: vec![insert_change("a")],
                ..Default::default()
            },
            MergePolicy::Error,
        )
        .unwrap();
    let id = receipt.inserted[0].id;

    let bump = |base_version: u64, name: &str| {
        let values = Attributes::from([("name".to_string(), AttributeValue::from(name))]);
        ChangeSet {
            updated: vec![ObjectChange {
                id,
                entity: "Person".to_string(),
                changed: values.clone(),
                values,
                base_version,
            }],
            ..Default::default()
        }
    };

    store.persist(&bump(1, "b"), MergePolicy::Error).unwrap();
    let err = store.persist(&bump(1, "c"), MergePolicy::Error).unwrap_err();
    assert!(matches!(err, StorageError::Conflict { .. }));

    let receipt = store.persist(&bump(1, "c"), MergePolicy::InMemoryWins).unwrap();
    assert_eq!(receipt.updated[0].get("name"), Some(&AttributeValue::from("c")));
    assert_eq!(receipt.updated[0].version, 3);
}

#[test]
fn test_open_temporary_store_from_config() {
    let config = StoreConfig {
        temporary: true,
        ..StoreConfig::default()
    };
    let store = Arc::new(SledStoreCoordinator::open(&config).unwrap());
    assert!(store.is_empty());
    assert_eq!(store.describe(), "sled:temporary");

    let registry = ContextRegistry::new();
    registry.initialize_stack(store.clone()).unwrap();
    let outcome = registry
        .save_with(|ctx| {
            ctx.insert_object("Note", Attributes::new())?;
            Ok(())
        })
        .unwrap();
    assert!(outcome.is_saved());
    assert!(run_loop::run_until(Duration::from_secs(5), || store.len() == 1));

    registry.clean_up();
}
