// src/controller/process.rs

use std::path::Path;
use std::process::{ExitStatus, Stdio};

use anyhow::Context;
use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::config::{Dag, Settings};
use crate::errors::Result;
use crate::sock::SockClient;

/// How to ask a run to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Cooperative cancellation over the live-status channel.
    Stop,
    /// Kill the execution process outright. Its record will not reach a
    /// terminal state.
    Kill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Success,
    Failed(i32),
    /// Terminated by a signal, no exit code.
    Signaled,
}

impl ExitOutcome {
    pub fn is_success(self) -> bool {
        self == ExitOutcome::Success
    }

    pub fn code(self) -> Option<i32> {
        match self {
            ExitOutcome::Success => Some(0),
            ExitOutcome::Failed(code) => Some(code),
            ExitOutcome::Signaled => None,
        }
    }
}

impl From<ExitStatus> for ExitOutcome {
    fn from(status: ExitStatus) -> Self {
        match status.code() {
            Some(0) => ExitOutcome::Success,
            Some(code) => ExitOutcome::Failed(code),
            None => ExitOutcome::Signaled,
        }
    }
}

/// A spawned execution process.
#[derive(Debug)]
pub struct RunHandle {
    request_id: String,
    pid: Option<u32>,
    child: Child,
    client: SockClient,
}

impl RunHandle {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Wait for the process to exit.
    pub async fn wait(&mut self) -> Result<ExitOutcome> {
        let status = self
            .child
            .wait()
            .await
            .with_context(|| format!("waiting for run {}", self.request_id))?;
        let outcome = ExitOutcome::from(status);
        debug!(request_id = %self.request_id, ?outcome, "execution process exited");
        Ok(outcome)
    }

    /// `Stop` is a no-op while the process has not bound its socket yet or
    /// after it is gone.
    pub async fn signal(&mut self, signal: Signal) -> Result<()> {
        match signal {
            Signal::Stop => {
                if !self.client.stop().await {
                    debug!(request_id = %self.request_id, "stop not acknowledged");
                }
            }
            Signal::Kill => {
                self.child
                    .start_kill()
                    .with_context(|| format!("killing run {}", self.request_id))?;
            }
        }
        Ok(())
    }
}

/// Launch `<bin> start --request-id=<id> --params=<p> <location>`.
pub(crate) fn spawn(
    bin: &Path,
    dag: &Dag,
    settings: &Settings,
    client: SockClient,
    request_id: &str,
    params: &str,
    work_dir: Option<&Path>,
) -> Result<RunHandle> {
    let mut cmd = Command::new(bin);
    cmd.arg("start")
        .arg(format!("--request-id={request_id}"))
        .arg(format!("--params={params}"))
        .arg(&dag.location)
        .envs(settings.child_env())
        .current_dir(work_dir.map(Path::to_path_buf).unwrap_or_else(|| dag.base_dir()))
        .stdin(Stdio::null());

    let child = cmd
        .spawn()
        .with_context(|| format!("spawning {} for DAG '{}'", bin.display(), dag.name))?;
    let pid = child.id();

    info!(dag = %dag.name, request_id, pid = ?pid, "execution process spawned");

    Ok(RunHandle {
        request_id: request_id.to_string(),
        pid,
        child,
        client,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;

    #[test]
    fn exit_status_mapping() {
        assert_eq!(ExitOutcome::from(ExitStatus::from_raw(0)), ExitOutcome::Success);
        assert_eq!(ExitOutcome::from(ExitStatus::from_raw(1 << 8)), ExitOutcome::Failed(1));
        assert_eq!(ExitOutcome::from(ExitStatus::from_raw(9)), ExitOutcome::Signaled);
        assert_eq!(ExitOutcome::Signaled.code(), None);
        assert!(!ExitOutcome::Failed(2).is_success());
    }
}
