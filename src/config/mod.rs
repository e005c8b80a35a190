// src/config/mod.rs

//! Configuration loading and validation for dagrun.
//!
//! Responsibilities:
//! - Define the TOML-backed DAG definition model (`model.rs`).
//! - Load a definition from disk (`loader.rs`).
//! - Validate dependencies and acyclicity (`validate.rs`).
//! - Resolve process-wide settings (`settings.rs`).

pub mod loader;
pub mod model;
pub mod settings;
pub mod validate;

pub use loader::{load_dag, load_from_path};
pub use model::{Dag, RawDagFile, Step, StepConfig};
pub use settings::Settings;
pub use validate::validate_dag_file;
