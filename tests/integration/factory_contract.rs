//! Integration tests for context construction

use super::test_utils::temp_store;
use ctxstack::confinement::run_loop;
use ctxstack::notification::NotificationCenter;
use ctxstack::{
    Attributes, ConfinementKind, ContextError, ContextFactory, MergePolicy, SaveOptions,
    StoreCoordinator,
};
use std::sync::Arc;

fn factory() -> ContextFactory {
    ContextFactory::new(Arc::new(NotificationCenter::new()))
}

#[test]
fn test_create_without_parent_or_store_fails() {
    let err = factory().create(None, None).unwrap_err();
    assert!(matches!(err, ContextError::Configuration(_)));
    assert!(err.is_contract_violation());
}

#[test]
fn test_create_with_parent_and_store_fails() {
    let (_dir, store) = temp_store();
    let factory = factory();
    let root = factory.create_attached_to_store(store.clone()).unwrap();

    let err = factory.create(Some(&root), Some(store.clone())).unwrap_err();
    assert!(matches!(err, ContextError::Configuration(_)));
    assert_eq!(store.attached_contexts(), vec![root.id()]);
}

#[test]
fn test_store_attached_context_is_owned_by_caller() {
    let (_dir, store) = temp_store();
    let root = factory().create_attached_to_store(store).unwrap();

    assert_eq!(root.kind(), ConfinementKind::OwnerThread);
    assert!(root.is_on_confinement());
    assert!(root.obtains_permanent_ids_before_saving());
    assert_eq!(root.merge_policy(), MergePolicy::Error);
}

#[test]
fn test_child_gets_private_queue_and_child_policy() {
    let (_dir, store) = temp_store();
    let factory = factory().with_child_merge_policy(MergePolicy::Overwrite);
    let root = factory.create_attached_to_store(store).unwrap();
    let child = factory.create_child(&root).unwrap();

    assert_eq!(child.kind(), ConfinementKind::PrivateQueue);
    assert!(!child.is_on_confinement());
    assert_eq!(child.merge_policy(), MergePolicy::Overwrite);
    assert!(child.obtains_permanent_ids_before_saving());
    assert!(child.perform_and_wait(|ctx| ctx.is_on_confinement()).unwrap());
}

#[test]
fn test_nested_children_save_synchronously_to_store() {
    let (_dir, store) = temp_store();
    let factory = factory();
    let root = factory.create_attached_to_store(store.clone()).unwrap();
    let middle = factory.create_child(&root).unwrap();
    let leaf = factory.create_child(&middle).unwrap();

    // Waiting on an owner-thread root from a queue only works while the owner
    // drains its loop; run the leaf's save on a helper thread.
    let leaf_for_save = leaf.clone();
    let saver = std::thread::spawn(move || {
        leaf_for_save
            .perform_and_wait(|ctx| -> Result<_, ContextError> {
                let id = ctx.insert_object("Leaf", Attributes::new())?;
                ctx.set_value(&id, "depth", 2i64)?;
                let outcome = ctx.save_with_options(SaveOptions::to_store_and_wait())?;
                Ok(outcome.event().unwrap().inserted[0].id)
            })
            .unwrap()
    });

    let done = run_loop::run_until(std::time::Duration::from_secs(5), || saver.is_finished());
    assert!(done);
    let id = saver.join().unwrap().unwrap();

    assert!(store.fetch(&id).unwrap().is_some());
    assert!(!root.has_changes().unwrap());
}
