// src/config/mod.rs

//! Configuration loading and validation.
//!
//! - `model.rs`: the YAML-backed data model.
//! - `loader.rs`: reading multi-document files and shallow merging.
//! - `validate.rs`: structural checks, run before any host is contacted.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_documents, load_merged, load_nuke_config, merge_documents};
pub use model::{NukeConfig, RawRunConfig, RunConfig, TaskEntry};
pub use validate::KERNEL_TASK;
