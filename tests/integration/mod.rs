//! Integration tests for the context stack

mod config_integration;
mod factory_contract;
mod registry_lifecycle;
mod reset_default;
mod store_integration;
