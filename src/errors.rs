// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DagrunError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Cycle detected in DAG: {0}")]
    DagCycle(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// No record exists for the requested key. Callers use this to tell
    /// "never ran" apart from "ran and failed".
    #[error("Status not found: {0}")]
    NotFound(String),

    #[error("Address already in use: {}", .0.display())]
    AddressInUse(PathBuf),

    #[error("Cannot open status writer: {0}")]
    WriteOpenError(String),

    #[error("Run {0} is still running; refusing to update its status")]
    ConflictingLiveRun(String),

    #[error("Invalid request id {request_id:?}: {reason}")]
    InvalidRequestId { request_id: String, reason: String },

    #[error("Run {request_id} failed (exit code {exit_code:?}, failed steps: {failed_nodes:?})")]
    RunFailed {
        request_id: String,
        exit_code: Option<i32>,
        failed_nodes: Vec<String>,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DagrunError {
    pub fn invalid_request_id(request_id: impl Into<String>, reason: impl Into<String>) -> Self {
        DagrunError::InvalidRequestId {
            request_id: request_id.into(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DagrunError::NotFound(_))
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DagrunError>;
