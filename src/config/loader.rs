// src/config/loader.rs

use std::fs;
use std::path::Path;

use crate::config::model::{Dag, RawDagFile};
use crate::config::validate::validate_dag_file;
use crate::errors::Result;

/// Read a DAG definition and return the raw `RawDagFile`.
///
/// This only performs TOML deserialization; use [`load_dag`] to also
/// validate and resolve the DAG identity.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawDagFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    let raw: RawDagFile = toml::from_str(&contents)?;
    Ok(raw)
}

/// Load, validate and canonicalize a DAG definition.
///
/// The canonical path becomes [`Dag::location`], so the same file reached
/// through different relative paths yields the same status history and the
/// same channel address.
pub fn load_dag(path: impl AsRef<Path>) -> Result<Dag> {
    let location = fs::canonicalize(path.as_ref())?;
    let raw = load_from_path(&location)?;
    validate_dag_file(raw, location)
}
