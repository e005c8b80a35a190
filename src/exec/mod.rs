// src/exec/mod.rs

//! Process execution layer.
//!
//! Runs step commands with `tokio::process::Command` and reports back to the
//! runtime via `RuntimeEvent`s.
//!
//! - [`executor_loop`] owns the running step processes.
//! - [`step_runner`] handles one step: precondition, command, cancellation.
//! - [`backend`] provides the `ExecutorBackend` trait and the
//!   `RealExecutorBackend` used in production, which tests replace with a
//!   fake.

pub mod backend;
pub mod executor_loop;
pub mod step_runner;

use std::path::{Path, PathBuf};

pub use backend::{ExecutorBackend, RealExecutorBackend};
pub use executor_loop::{ExecutorCommand, spawn_executor};

pub const PARAMS_ENV: &str = "DAGRUN_PARAMS";
pub const REQUEST_ID_ENV: &str = "DAGRUN_REQUEST_ID";

/// Run-wide context every step process gets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepEnv {
    /// Directory steps run in unless they set `dir`; relative `dir`s are
    /// resolved against it.
    pub base_dir: PathBuf,
    pub request_id: String,
    /// Raw parameter string. Also passed as positional arguments.
    pub params: String,
}

impl StepEnv {
    pub fn working_dir(&self, step_dir: Option<&Path>) -> PathBuf {
        match step_dir {
            Some(dir) if dir.is_absolute() => dir.to_path_buf(),
            Some(dir) => self.base_dir.join(dir),
            None => self.base_dir.clone(),
        }
    }
}
