// src/models/status.rs

//! The status record of one run and its JSON wire form.
//!
//! The same document is served over the live-status channel and appended to
//! the status store, so field names and integer codes are a compatibility
//! surface.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::model::{Dag, Step};
use crate::errors::Result;
use crate::types::{NodeStatus, SchedulerStatus};

/// Process id of the supervising process, `-1` when there is none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pid(pub i32);

impl Pid {
    pub const NONE: Pid = Pid(-1);

    pub fn is_some(self) -> bool {
        self.0 > 0
    }

    pub fn current() -> Self {
        Pid::from(std::process::id())
    }
}

impl Default for Pid {
    fn default() -> Self {
        Pid::NONE
    }
}

impl From<u32> for Pid {
    fn from(pid: u32) -> Self {
        i32::try_from(pid).map(Pid).unwrap_or(Pid::NONE)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot of one step inside a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub name: String,
    #[serde(default)]
    pub command: String,
    /// Positional parameters the command was (or will be) invoked with.
    #[serde(default)]
    pub args: Vec<String>,
    pub status: NodeStatus,
    #[serde(default)]
    pub status_text: String,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Node {
    pub fn from_step(step: &Step, args: &[String]) -> Self {
        Self {
            name: step.name.clone(),
            command: step.command.clone(),
            args: args.to_vec(),
            status: NodeStatus::NotStarted,
            status_text: NodeStatus::NotStarted.as_str().to_string(),
            started_at: None,
            finished_at: None,
            exit_code: None,
            error: None,
        }
    }

    pub fn set_status(&mut self, status: NodeStatus) {
        self.status = status;
        self.status_text = status.as_str().to_string();
    }
}

/// Status record of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub request_id: String,
    pub name: String,
    pub status: SchedulerStatus,
    #[serde(default)]
    pub status_text: String,
    #[serde(default)]
    pub pid: Pid,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub params: String,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Status {
    /// Record with explicit parts; nodes are taken as given.
    pub fn new(
        dag: &Dag,
        nodes: Vec<Node>,
        status: SchedulerStatus,
        pid: Pid,
        started_at: Option<DateTime<Utc>>,
        finished_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            request_id: String::new(),
            name: dag.name.clone(),
            status,
            status_text: status.as_str().to_string(),
            pid,
            nodes,
            params: dag.default_params.clone(),
            started_at,
            finished_at,
        }
    }

    /// What a DAG that has never run (or whose history is gone) reports.
    pub fn placeholder(dag: &Dag) -> Self {
        let args = split_params(&dag.default_params);
        let nodes = dag.steps.iter().map(|s| Node::from_step(s, &args)).collect();
        Status::new(dag, nodes, SchedulerStatus::None, Pid::NONE, None, None)
    }

    /// Fresh record for a run that is starting now in this process.
    pub fn new_run(
        dag: &Dag,
        request_id: impl Into<String>,
        params: impl Into<String>,
        pid: Pid,
        started_at: DateTime<Utc>,
    ) -> Self {
        let params = params.into();
        let args = split_params(&params);
        let nodes = dag.steps.iter().map(|s| Node::from_step(s, &args)).collect();
        let mut status = Status::new(
            dag,
            nodes,
            SchedulerStatus::Running,
            pid,
            Some(started_at),
            None,
        );
        status.request_id = request_id.into();
        status.params = params;
        status
    }

    pub fn set_status(&mut self, status: SchedulerStatus) {
        self.status = status;
        self.status_text = status.as_str().to_string();
    }

    pub fn is_running(&self) -> bool {
        self.status == SchedulerStatus::Running
    }

    /// A durable record that still says `Running` but has no live owner
    /// belongs to a process that died before its final write. Report it as
    /// `None` instead of pretending it is still running.
    pub fn settle_not_live(&mut self) {
        if self.status == SchedulerStatus::Running {
            self.set_status(SchedulerStatus::None);
            self.pid = Pid::NONE;
        }
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn node_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.name == name)
    }

    /// Names of nodes that ended in `Error`.
    pub fn failed_nodes(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| n.status == NodeStatus::Error)
            .map(|n| n.name.clone())
            .collect()
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// A status together with the store segment it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusFile {
    pub file: PathBuf,
    pub status: Status,
}

/// Positional arguments derived from a parameter string.
pub fn split_params(params: &str) -> Vec<String> {
    params.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dag() -> Dag {
        Dag::new_unchecked(
            "wire",
            "/defs/wire.toml",
            vec![Step::new("a", "echo a"), Step::new("b", "echo b").after("a")],
        )
    }

    #[test]
    fn wire_format_uses_camel_case_and_integer_codes() {
        let now = Utc::now();
        let mut st = Status::new_run(&dag(), "req-1", "x y", Pid(42), now);
        st.nodes[0].set_status(NodeStatus::Skipped);

        let value: serde_json::Value = serde_json::from_slice(&st.to_json().unwrap()).unwrap();
        assert_eq!(value["requestId"], "req-1");
        assert_eq!(value["name"], "wire");
        assert_eq!(value["status"], 1);
        assert_eq!(value["pid"], 42);
        assert_eq!(value["params"], "x y");
        assert_eq!(value["finishedAt"], serde_json::Value::Null);
        assert_eq!(value["nodes"][0]["status"], 5);
        assert_eq!(value["nodes"][1]["args"], serde_json::json!(["x", "y"]));
        assert!(value["startedAt"].is_string());
    }

    #[test]
    fn decodes_minimal_document() {
        let st = Status::from_json(br#"{"requestId":"r","name":"n","status":4}"#).unwrap();
        assert_eq!(st.status, SchedulerStatus::Cancel);
        assert_eq!(st.pid, Pid::NONE);
        assert!(st.nodes.is_empty());
        assert!(st.started_at.is_none());
    }

    #[test]
    fn placeholder_reports_none_with_all_nodes_not_started() {
        let st = Status::placeholder(&dag());
        assert_eq!(st.status, SchedulerStatus::None);
        assert_eq!(st.pid, Pid::NONE);
        assert_eq!(st.nodes.len(), 2);
        assert!(st.nodes.iter().all(|n| n.status == NodeStatus::NotStarted));
    }

    #[test]
    fn settle_not_live_only_touches_running_records() {
        let mut running = Status::new_run(&dag(), "r", "", Pid(7), Utc::now());
        running.settle_not_live();
        assert_eq!(running.status, SchedulerStatus::None);
        assert_eq!(running.pid, Pid::NONE);

        let mut done = Status::new_run(&dag(), "r", "", Pid::NONE, Utc::now());
        done.set_status(SchedulerStatus::Success);
        done.settle_not_live();
        assert_eq!(done.status, SchedulerStatus::Success);
    }

    #[test]
    fn failed_nodes_lists_errors_only() {
        let mut st = Status::new_run(&dag(), "r", "", Pid::NONE, Utc::now());
        st.nodes[1].set_status(NodeStatus::Error);
        st.nodes[0].set_status(NodeStatus::Success);
        assert_eq!(st.failed_nodes(), vec!["b".to_string()]);
    }
}
