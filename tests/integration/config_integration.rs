//! Integration tests for Configuration System

use super::test_utils::with_xdg_env;
use ctxstack::cli::{Commands, RunContext};
use ctxstack::config::ConfigLoader;
use ctxstack::MergePolicy;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_defaults_without_any_files() {
    let test_dir = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();

    let config = with_xdg_env(&test_dir, || ConfigLoader::load(workspace.path()).unwrap());
    assert!(!config.store.temporary);
    assert_eq!(config.contexts.child_merge_policy, MergePolicy::Error);
    assert!(config.store.path.ends_with("store"));
}

#[test]
fn test_workspace_file_overrides_global_file() {
    let test_dir = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();

    let global_dir = test_dir.path().join("config-home").join("ctxstack");
    std::fs::create_dir_all(&global_dir).unwrap();
    std::fs::write(
        global_dir.join("config.toml"),
        r#"
[store]
path = "/global/store"

[contexts]
child_merge_policy = "overwrite"
"#,
    )
    .unwrap();

    std::fs::create_dir_all(workspace.path().join("config")).unwrap();
    std::fs::write(
        workspace.path().join("config").join("config.toml"),
        r#"
[contexts]
child_merge_policy = "store_wins"
"#,
    )
    .unwrap();

    let config = with_xdg_env(&test_dir, || ConfigLoader::load(workspace.path()).unwrap());
    assert_eq!(config.store.path, PathBuf::from("/global/store"));
    assert_eq!(config.contexts.child_merge_policy, MergePolicy::StoreWins);
}

#[test]
fn test_environment_specific_workspace_file() {
    let test_dir = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    let config_dir = workspace.path().join("config");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("config.toml"),
        "[store]\npath = \"/base/store\"\n",
    )
    .unwrap();
    std::fs::write(
        config_dir.join("staging.toml"),
        "[store]\npath = \"/staging/store\"\n",
    )
    .unwrap();

    let config = with_xdg_env(&test_dir, || {
        std::env::set_var("CTXSTACK_ENV", "staging");
        ConfigLoader::load(workspace.path()).unwrap()
    });
    assert_eq!(config.store.path, PathBuf::from("/staging/store"));
}

#[test]
fn test_invalid_policy_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("bad.toml");
    std::fs::write(&config_file, "[contexts]\nchild_merge_policy = \"sometimes\"\n").unwrap();

    assert!(ConfigLoader::load_from_file(&config_file).is_err());
}

#[test]
fn test_run_context_store_override() {
    let test_dir = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    let store_dir = workspace.path().join("override");

    let run = with_xdg_env(&test_dir, || {
        RunContext::new(workspace.path().to_path_buf(), None, Some(store_dir.clone())).unwrap()
    });
    assert_eq!(run.config().store.path, store_dir);

    let rendered = run.execute(&Commands::Config).unwrap();
    assert!(rendered.contains("override"));
}
