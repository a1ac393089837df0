//! Integration tests for root/default slot management and teardown

use super::test_utils::{initialized_registry, temp_store};
use ctxstack::registry::{DEFAULT_CONTEXT_LABEL, ROOT_CONTEXT_LABEL};
use ctxstack::store::same_coordinator;
use ctxstack::confinement::run_loop;
use ctxstack::{
    AttributeValue, Attributes, ConfinementKind, ContextRegistry, MergePolicy, StoreCoordinator,
};
use std::sync::Arc;

#[test]
fn test_initialize_stack_wires_root_and_default() {
    let (_dir, store, registry) = initialized_registry();

    let root = registry.root().unwrap();
    let default = registry.default_context().unwrap();

    assert!(root.parent().is_none());
    let expected: Arc<dyn StoreCoordinator> = store.clone();
    assert!(same_coordinator(root.store().unwrap(), &expected));
    assert!(Arc::ptr_eq(default.parent().unwrap(), &root));

    assert_eq!(root.label(), ROOT_CONTEXT_LABEL);
    assert_eq!(default.label(), DEFAULT_CONTEXT_LABEL);
    assert_eq!(root.merge_policy(), MergePolicy::InMemoryWins);
    assert_eq!(root.kind(), ConfinementKind::OwnerThread);
    assert_eq!(default.kind(), ConfinementKind::PrivateQueue);
    assert!(root.obtains_permanent_ids_before_saving());
    assert!(default.obtains_permanent_ids_before_saving());
    assert_eq!(store.attached_contexts(), vec![root.id()]);

    assert!(registry.is_propagating());
    assert_eq!(registry.notifications().subscriptions_for(root.id()), 1);

    registry.clean_up();
}

#[test]
fn test_set_root_none_removes_its_subscriptions() {
    let (_dir, _store, registry) = initialized_registry();
    let root = registry.root().unwrap();

    registry.set_root(None);

    assert!(registry.root().is_none());
    assert_eq!(registry.notifications().subscriptions_for(root.id()), 0);
    assert!(!registry.is_propagating());
    assert!(registry.default_context().is_some());

    registry.clean_up();
}

#[test]
fn test_detached_root_saves_do_not_reach_default() {
    let (_dir, _store, registry) = initialized_registry();
    let root = registry.root().unwrap();
    let default = registry.default_context().unwrap();

    registry.set_root(None);

    let attributes = Attributes::from([("name".to_string(), AttributeValue::from("late"))]);
    root.insert_object("Person", attributes).unwrap();
    assert!(root.save().unwrap().is_saved());

    run_loop::run_pending();
    default.perform_and_wait(|_| ()).unwrap();

    assert_eq!(default.stats().merges, 0);
    assert!(default.last_merge().is_none());

    registry.clean_up();
}

#[test]
fn test_default_without_root_is_never_subscribed_retroactively() {
    let (_dir, store) = temp_store();
    let registry = ContextRegistry::new();

    let root = registry.factory().create_attached_to_store(store).unwrap();
    let default = registry.factory().create_child(&root).unwrap();

    registry.set_default(Some(default));
    assert_eq!(registry.notifications().subscription_count(), 0);

    registry.set_root(Some(root));
    assert_eq!(registry.notifications().subscription_count(), 0);
    assert!(!registry.is_propagating());

    registry.clean_up();
}

#[test]
fn test_replacing_default_moves_the_subscription() {
    let (_dir, _store, registry) = initialized_registry();
    let root = registry.root().unwrap();
    let first = registry.default_context().unwrap();

    let second = registry.factory().create_child(&root).unwrap();
    registry.set_default(Some(second.clone()));

    assert_eq!(registry.notifications().subscription_count(), 1);
    assert_eq!(first.label(), DEFAULT_CONTEXT_LABEL);
    assert_eq!(registry.default_context().unwrap().id(), second.id());
    assert!(registry.is_propagating());

    registry.clean_up();
}

#[test]
fn test_initialize_stack_again_replaces_both_slots() {
    let (_dir, _store, registry) = initialized_registry();
    let old_root = registry.root().unwrap();
    let old_default = registry.default_context().unwrap();

    let (_dir2, other_store) = temp_store();
    registry.initialize_stack(other_store).unwrap();

    let root = registry.root().unwrap();
    assert_ne!(root.id(), old_root.id());
    assert_ne!(registry.default_context().unwrap().id(), old_default.id());
    assert_eq!(registry.notifications().subscriptions_for(old_root.id()), 0);
    assert_eq!(registry.notifications().subscription_count(), 1);

    registry.clean_up();
}

#[test]
fn test_clean_up_is_idempotent() {
    let (_dir, _store, registry) = initialized_registry();

    registry.clean_up();
    assert!(registry.root().is_none());
    assert!(registry.default_context().is_none());
    assert_eq!(registry.notifications().subscription_count(), 0);

    registry.clean_up();
    assert!(registry.root().is_none());
    assert!(registry.default_context().is_none());
    assert_eq!(registry.notifications().subscription_count(), 0);
}

#[test]
fn test_clean_up_on_empty_registry() {
    let registry = ContextRegistry::new();
    registry.clean_up();
    assert_eq!(registry.notifications().subscription_count(), 0);
}
