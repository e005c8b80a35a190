// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// A DAG definition as read from a TOML file.
///
/// ```toml
/// name = "etl"
/// params = "2024-01-01 full"
/// restart_wait_sec = 5
///
/// [step.extract]
/// command = "./extract.sh $1"
///
/// [step.load]
/// command = "./load.sh"
/// after = ["extract"]
/// ```
///
/// Everything except the steps is optional.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawDagFile {
    /// Display name; defaults to the file stem.
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Default parameter string used when a run does not supply one.
    #[serde(default)]
    pub params: Option<String>,

    /// Seconds to wait between the old run ending and the new one starting
    /// on `restart`.
    #[serde(default)]
    pub restart_wait_sec: u64,

    /// Overrides `Settings::hist_retention_days` for this DAG.
    #[serde(default)]
    pub hist_retention_days: Option<u32>,

    /// All steps from `[step.<name>]`.
    #[serde(default)]
    pub step: BTreeMap<String, StepConfig>,
}

/// `[step.<name>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StepConfig {
    /// Shell command, run with `sh -c`.
    pub command: String,

    /// Steps that must finish (successfully or skipped) before this one.
    #[serde(default)]
    pub after: Vec<String>,

    /// Working directory; defaults to the directory of the DAG file.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Shell command evaluated before the step; a non-zero exit skips it.
    #[serde(default)]
    pub precondition: Option<String>,
}

/// A validated DAG definition.
///
/// `steps` is in a deterministic topological order, which is also the order
/// of `nodes` in every status record written for this DAG.
#[derive(Debug, Clone, PartialEq)]
pub struct Dag {
    pub name: String,
    /// Canonical path of the definition file. This is the DAG's identity.
    pub location: PathBuf,
    pub description: Option<String>,
    pub default_params: String,
    pub restart_wait: Duration,
    pub hist_retention_days: Option<u32>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub name: String,
    pub command: String,
    pub after: Vec<String>,
    pub dir: Option<PathBuf>,
    pub precondition: Option<String>,
}

impl Dag {
    /// Build a DAG without validation. Intended for tests and tools that
    /// already hold a checked step list.
    pub fn new_unchecked(name: impl Into<String>, location: impl Into<PathBuf>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            description: None,
            default_params: String::new(),
            restart_wait: Duration::ZERO,
            hist_retention_days: None,
            steps,
        }
    }

    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Directory commands run in when a step has no `dir`.
    pub fn base_dir(&self) -> PathBuf {
        self.location
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

impl Step {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            after: Vec::new(),
            dir: None,
            precondition: None,
        }
    }

    pub fn after(mut self, dep: impl Into<String>) -> Self {
        self.after.push(dep.into());
        self
    }
}
