//! Property-based tests for root/default slot bookkeeping

use ctxstack::{ContextRegistry, SledStoreCoordinator, StoreCoordinator};
use proptest::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
enum SlotOp {
    InitializeStack,
    NewRoot,
    NewDefault,
    ClearRoot,
    ClearDefault,
    CleanUp,
}

fn slot_op() -> impl Strategy<Value = SlotOp> {
    prop_oneof![
        Just(SlotOp::InitializeStack),
        Just(SlotOp::NewRoot),
        Just(SlotOp::NewDefault),
        Just(SlotOp::ClearRoot),
        Just(SlotOp::ClearDefault),
        Just(SlotOp::CleanUp),
    ]
}

fn apply(registry: &ContextRegistry, store: &Arc<dyn StoreCoordinator>, op: SlotOp) {
    let factory = registry.factory();
    match op {
        SlotOp::InitializeStack => registry.initialize_stack(store.clone()).unwrap(),
        SlotOp::NewRoot => {
            let root = factory.create_attached_to_store(store.clone()).unwrap();
            registry.set_root(Some(root));
        }
        SlotOp::NewDefault => {
            if let Some(root) = registry.root() {
                registry.set_default(Some(factory.create_child(&root).unwrap()));
            }
        }
        SlotOp::ClearRoot => registry.set_root(None),
        SlotOp::ClearDefault => registry.set_default(None),
        SlotOp::CleanUp => registry.clean_up(),
    }
}

/// Propagation only ever links the current default to the current root
#[test]
fn test_at_most_one_live_subscription() {
    let mut runner = proptest::test_runner::TestRunner::new(ProptestConfig::with_cases(32));

    runner
        .run(&prop::collection::vec(slot_op(), 1..12), |ops| {
            let store: Arc<dyn StoreCoordinator> =
                Arc::new(SledStoreCoordinator::temporary().unwrap());
            let registry = ContextRegistry::new();

            for op in ops {
                apply(&registry, &store, op);
                let notifications = registry.notifications();
                prop_assert!(notifications.subscription_count() <= 1);

                if registry.is_propagating() {
                    let root = registry.root().unwrap();
                    let default = registry.default_context().unwrap();
                    prop_assert!(Arc::ptr_eq(default.parent().unwrap(), &root));
                    prop_assert_eq!(notifications.subscriptions_for(root.id()), 1);
                }
            }

            registry.clean_up();
            prop_assert!(registry.root().is_none());
            prop_assert!(registry.default_context().is_none());
            prop_assert_eq!(registry.notifications().subscription_count(), 0);
            Ok(())
        })
        .unwrap();
}

/// A default set before any root never becomes subscribed by setting a root
#[test]
fn test_late_root_never_subscribes_existing_default() {
    let mut runner = proptest::test_runner::TestRunner::new(ProptestConfig::with_cases(16));

    runner
        .run(&(1usize..4), |root_swaps| {
            let store: Arc<dyn StoreCoordinator> =
                Arc::new(SledStoreCoordinator::temporary().unwrap());
            let registry = ContextRegistry::new();
            let factory = registry.factory();

            let orphan_parent = factory.create_attached_to_store(store.clone()).unwrap();
            registry.set_default(Some(factory.create_child(&orphan_parent).unwrap()));

            for _ in 0..root_swaps {
                let root = factory.create_attached_to_store(store.clone()).unwrap();
                registry.set_root(Some(root));
                prop_assert!(!registry.is_propagating());
                prop_assert_eq!(registry.notifications().subscription_count(), 0);
            }

            registry.clean_up();
            Ok(())
        })
        .unwrap();
}
