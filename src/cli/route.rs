//! CLI route: single route table and run context.
//!
//! Every data command builds a fresh stack (root on this thread, default on a
//! private queue), performs its edit in the default context, saves to the
//! store, and drains this thread's run loop so root's save completes.

use crate::cli::output::{render_json, save_event_json, snapshot_json};
use crate::cli::parse::Commands;
use crate::config::{ConfigLoader, StackConfig};
use crate::confinement::run_loop;
use crate::context::{Context, ContextFactory, SaveOutcome};
use crate::error::ContextError;
use crate::notification::NotificationCenter;
use crate::registry::ContextRegistry;
use crate::store::SledStoreCoordinator;
use crate::types::{AttributeValue, ObjectId};
use parking_lot::Mutex;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Runtime context for CLI execution: resolved configuration and the store,
/// opened on first use and shared by every command run through this value.
pub struct RunContext {
    config: StackConfig,
    store: Mutex<Option<Arc<SledStoreCoordinator>>>,
}

/// Stack opened for one command.
struct OpenStack {
    registry: Arc<ContextRegistry>,
    store: Arc<SledStoreCoordinator>,
    root: Arc<Context>,
    default: Arc<Context>,
}

impl RunContext {
    /// Create run context from workspace root, optional config path and
    /// optional store override. Uses ConfigLoader only.
    pub fn new(
        workspace_root: PathBuf,
        config_path: Option<PathBuf>,
        store_path: Option<PathBuf>,
    ) -> Result<Self, ContextError> {
        let mut config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        if let Some(path) = store_path {
            config.store.path = path;
            config.store.temporary = false;
        }
        Self::from_config(config)
    }

    pub fn from_config(config: StackConfig) -> Result<Self, ContextError> {
        config.validate()?;
        Ok(Self {
            config,
            store: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, ContextError> {
        if let Commands::Config = command {
            return self.config.to_toml_string();
        }

        let stack = self.open_stack()?;
        let result = self.execute_on(&stack, command.clone());
        stack.registry.clean_up();
        stack.store.flush()?;
        result
    }

    fn store(&self) -> Result<Arc<SledStoreCoordinator>, ContextError> {
        let mut slot = self.store.lock();
        if let Some(store) = slot.as_ref() {
            return Ok(store.clone());
        }
        let store = Arc::new(SledStoreCoordinator::open(&self.config.store)?);
        *slot = Some(store.clone());
        Ok(store)
    }

    fn open_stack(&self) -> Result<OpenStack, ContextError> {
        let store = self.store()?;
        let factory = ContextFactory::new(Arc::new(NotificationCenter::new()))
            .with_child_merge_policy(self.config.contexts.child_merge_policy);
        let registry = ContextRegistry::with_factory(factory);
        registry.initialize_stack(store.clone())?;

        let missing = || ContextError::Configuration("Context stack is not initialized".to_string());
        let root = registry.root().ok_or_else(missing)?;
        let default = registry.default_context().ok_or_else(missing)?;
        debug!(root = %root, default = %default, "Stack opened");
        Ok(OpenStack {
            registry,
            store,
            root,
            default,
        })
    }

    fn execute_on(&self, stack: &OpenStack, command: Commands) -> Result<String, ContextError> {
        match command {
            Commands::Insert { entity, values } => {
                let outcome = stack.default.perform_and_wait(move |ctx| -> Result<_, ContextError> {
                    ctx.insert_object(&entity, values.into_iter().collect())?;
                    ctx.save_to_store()
                })??;
                let id = match outcome.event().and_then(|e| e.inserted.first()) {
                    Some(snapshot) => snapshot.id,
                    None => {
                        return Err(ContextError::SaveIncomplete(
                            "insert produced no saved object".to_string(),
                        ))
                    }
                };
                self.finish_root_save(stack)?;
                info!(id = %id, "Object inserted");
                self.render_stored(stack, &id, &outcome)
            }
            Commands::Update { id, values } => {
                let outcome = stack
                    .default
                    .perform_and_wait(move |ctx| apply_values(ctx, &id, values))??;
                self.finish_root_save(stack)?;
                self.render_stored(stack, &id, &outcome)
            }
            Commands::Delete { id } => {
                let outcome = stack.default.perform_and_wait(move |ctx| -> Result<_, ContextError> {
                    ctx.delete_object(&id)?;
                    ctx.save_to_store()
                })??;
                self.finish_root_save(stack)?;
                let saved = outcome.event().map(save_event_json);
                render_json(&json!({ "deleted": id.to_string(), "save": saved }))
            }
            Commands::Show { id } => {
                let snapshot = stack
                    .default
                    .perform_and_wait(move |ctx| ctx.object(&id))??
                    .ok_or(ContextError::ObjectNotFound(id))?;
                render_json(&snapshot_json(&snapshot))
            }
            Commands::Config => self.config.to_toml_string(),
        }
    }

    /// Root saves on this thread's run loop; drain it and check it emptied.
    fn finish_root_save(&self, stack: &OpenStack) -> Result<(), ContextError> {
        let ran = run_loop::run_pending();
        debug!(jobs = ran, "Drained run loop");
        if stack.root.has_changes()? {
            return Err(ContextError::SaveIncomplete(format!(
                "{} still has unsaved changes; see the log for the store error",
                stack.root
            )));
        }
        Ok(())
    }

    fn render_stored(
        &self,
        stack: &OpenStack,
        id: &ObjectId,
        outcome: &SaveOutcome,
    ) -> Result<String, ContextError> {
        let stored = stack
            .root
            .object(id)?
            .ok_or(ContextError::ObjectNotFound(*id))?;
        render_json(&json!({
            "object": snapshot_json(&stored),
            "save": outcome.event().map(save_event_json),
        }))
    }
}

fn apply_values(
    ctx: &Arc<Context>,
    id: &ObjectId,
    values: Vec<(String, AttributeValue)>,
) -> Result<SaveOutcome, ContextError> {
    for (key, value) in values {
        ctx.set_value(id, key, value)?;
    }
    ctx.save_to_store()
}
