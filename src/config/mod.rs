// src/config/mod.rs

//! Configuration loading and validation for flowsched.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate references, budgets and DAG correctness (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{config_root_dir, load_and_validate, load_from_path, parse_str, resolve_relative};
pub use model::{
    ConfigFile, CoreConfig, ImplementationConfig, RawConfigFile, SchedulerSection, TaskConfig,
};
