//! Integration tests for resetting the default context

use super::test_utils::{initialized_registry, temp_store};
use ctxstack::confinement::run_loop;
use ctxstack::{AttributeValue, Attributes, ContextError, ContextRegistry, ResetOutcome};
use std::sync::Arc;
use std::thread;

/// Registry whose default is owner-confined to the calling thread.
fn owner_confined_registry() -> (tempfile::TempDir, Arc<ContextRegistry>) {
    let (dir, store) = temp_store();
    let registry = ContextRegistry::new();
    let root = registry.factory().create_attached_to_store(store).unwrap();
    registry.set_root(Some(root.clone()));
    let default = registry
        .factory()
        .create_child_on_current_thread(&root)
        .unwrap();
    registry.set_default(Some(default));
    (dir, registry)
}

#[test]
fn test_reset_without_default_is_skipped() {
    let registry = ContextRegistry::new();
    assert_eq!(registry.reset_default().unwrap(), ResetOutcome::Skipped);
}

#[test]
fn test_reset_on_primary_thread_discards_pending_changes() {
    let (_dir, registry) = owner_confined_registry();
    let default = registry.default_context().unwrap();
    default.insert_object("Person", Attributes::new()).unwrap();
    assert!(default.has_changes().unwrap());

    assert_eq!(registry.reset_default().unwrap(), ResetOutcome::Performed);
    assert!(!default.has_changes().unwrap());
    assert_eq!(default.registered_count().unwrap(), 0);
    assert_eq!(default.stats().resets, 1);

    registry.clean_up();
}

#[test]
fn test_reset_from_background_thread_is_deferred_once() {
    let (_dir, registry) = owner_confined_registry();
    let default = registry.default_context().unwrap();
    default.insert_object("Person", Attributes::new()).unwrap();

    let background = registry.clone();
    let outcome = thread::spawn(move || background.reset_default())
        .join()
        .unwrap()
        .unwrap();
    assert_eq!(outcome, ResetOutcome::Deferred);

    // Nothing happened yet.
    assert!(default.has_changes().unwrap());
    assert_eq!(default.stats().resets, 0);

    assert_eq!(run_loop::run_pending(), 1);
    assert!(!default.has_changes().unwrap());
    assert_eq!(default.stats().resets, 1);
    assert_eq!(run_loop::run_pending(), 0);

    registry.clean_up();
}

#[test]
fn test_reset_of_queue_confined_default_is_contract_violation() {
    let (_dir, _store, registry) = initialized_registry();

    let err = registry.reset_default().unwrap_err();
    assert!(matches!(err, ContextError::ContractViolation(_)));
    assert!(err.is_contract_violation());

    registry.clean_up();
}

#[test]
fn test_reset_faults_fresh_state_afterwards() {
    let (_dir, registry) = owner_confined_registry();
    let root = registry.root().unwrap();
    let default = registry.default_context().unwrap();

    let temp = root.insert_object("Person", Attributes::new()).unwrap();
    root.set_value(&temp, "name", "stored").unwrap();
    let id = root.save().unwrap().event().unwrap().inserted[0].id;

    // Merge into the owner-confined default runs on this thread's loop.
    assert_eq!(run_loop::run_pending(), 1);
    assert!(default.last_merge().unwrap().changed.contains(&id));

    default.set_value(&id, "name", "local").unwrap();
    assert_eq!(registry.reset_default().unwrap(), ResetOutcome::Performed);

    let fresh = default.object(&id).unwrap().unwrap();
    assert_eq!(fresh.get("name"), Some(&AttributeValue::from("stored")));

    registry.clean_up();
}
