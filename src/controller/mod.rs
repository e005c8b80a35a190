// src/controller/mod.rs

//! Lifecycle controller for one DAG.
//!
//! Spawns and supervises execution processes, answers status queries by
//! merging the live channel with the durable store, and applies
//! administrative edits to finished runs.

pub mod merge;
pub mod process;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{Dag, Settings};
use crate::errors::{DagrunError, Result};
use crate::ident::{new_request_id, socket_addr, validate_request_id};
use crate::models::{Status, StatusFile};
use crate::sock::SockClient;
use crate::store::StatusStore;
use crate::types::SchedulerStatus;

pub use merge::{StatusSource, resolve_status};
pub use process::{ExitOutcome, RunHandle, Signal};

/// Parameters of one launch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunRequest {
    /// `None` runs with the DAG's default params.
    pub params: Option<String>,
    /// `None` generates a fresh id.
    pub request_id: Option<String>,
    /// Working directory of the execution process. Defaults to the
    /// directory holding the DAG file.
    pub work_dir: Option<PathBuf>,
}

impl RunRequest {
    pub fn with_params(params: impl Into<String>) -> Self {
        Self {
            params: Some(params.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Controller {
    dag: Arc<Dag>,
    settings: Arc<Settings>,
    store: StatusStore,
    client: SockClient,
}

impl Controller {
    pub fn new(dag: Dag, settings: &Settings) -> Self {
        let addr = socket_addr(&settings.socket_dir, &dag.name, &dag.location);
        Self {
            store: StatusStore::new(&settings.data_dir),
            client: SockClient::new(addr, settings.status_timeout),
            settings: Arc::new(settings.clone()),
            dag: Arc::new(dag),
        }
    }

    pub fn dag(&self) -> &Dag {
        &self.dag
    }

    pub fn store(&self) -> &StatusStore {
        &self.store
    }

    /// Address the execution process for this DAG binds.
    pub fn socket_addr(&self) -> &Path {
        self.client.addr()
    }

    /// Spawn an execution process and return without waiting for it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_async(&self, bin: &Path, request: RunRequest) -> Result<RunHandle> {
        let request_id = match request.request_id {
            Some(id) => {
                validate_request_id(&id)?;
                id
            }
            None => new_request_id(),
        };
        let params = request
            .params
            .unwrap_or_else(|| self.dag.default_params.clone());

        process::spawn(
            bin,
            &self.dag,
            &self.settings,
            self.client.clone(),
            &request_id,
            &params,
            request.work_dir.as_deref(),
        )
    }

    /// Spawn an execution process and wait for it to exit.
    ///
    /// Returns the run's request id. The run counts as failed when the
    /// process exits unsuccessfully or its final record says `Error`.
    pub async fn start(&self, bin: &Path, request: RunRequest) -> Result<String> {
        let mut handle = self.start_async(bin, request)?;
        let outcome = handle.wait().await?;
        let request_id = handle.request_id().to_string();

        let record = match self.store.by_request_id(&self.dag, &request_id) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(dag = %self.dag.name, request_id = %request_id, error = %e, "no final record for run");
                None
            }
        };

        let errored = record
            .as_ref()
            .is_some_and(|r| r.status == SchedulerStatus::Error);
        if outcome.is_success() && !errored {
            info!(dag = %self.dag.name, request_id = %request_id, "run finished");
            return Ok(request_id);
        }

        Err(DagrunError::RunFailed {
            failed_nodes: record.map(|r| r.failed_nodes()).unwrap_or_default(),
            exit_code: outcome.code(),
            request_id,
        })
    }

    /// Ask a live run to cancel. Succeeds when nothing is running.
    pub async fn stop(&self) -> Result<()> {
        match self.client.status().await {
            Some(live) => {
                info!(dag = %self.dag.name, request_id = %live.request_id, "requesting stop");
                if !self.client.stop().await {
                    debug!(dag = %self.dag.name, "run went away before stop was delivered");
                }
            }
            None => debug!(dag = %self.dag.name, "nothing to stop"),
        }
        Ok(())
    }

    /// Stop the current run, wait until it has ended, then start a new one
    /// with `params` (or the DAG's defaults).
    pub async fn restart(&self, bin: &Path, params: Option<String>) -> Result<String> {
        self.stop().await?;
        self.wait_until_not_running().await;

        if !self.dag.restart_wait.is_zero() {
            debug!(dag = %self.dag.name, wait = ?self.dag.restart_wait, "waiting before restart");
            tokio::time::sleep(self.dag.restart_wait).await;
        }

        self.start(
            bin,
            RunRequest {
                params,
                ..RunRequest::default()
            },
        )
        .await
    }

    /// Start a new run with the parameters recorded for `request_id`.
    pub async fn retry(&self, bin: &Path, request_id: &str) -> Result<String> {
        let prior = self.store.by_request_id(&self.dag, request_id)?;
        info!(dag = %self.dag.name, from = request_id, params = %prior.params, "retrying run");
        self.start(bin, RunRequest::with_params(prior.params)).await
    }

    /// Current status: the live process if one answers, else the latest
    /// durable record, else a `None`-status placeholder.
    pub async fn get_status(&self) -> Result<Status> {
        resolve_status(self).await
    }

    /// Same answer as [`Controller::get_status`]. Once no process is live
    /// this is the most recent run's final record, which is what callers
    /// waiting for termination poll.
    pub async fn get_last_status(&self) -> Result<Status> {
        self.get_status().await
    }

    /// Historical lookup; never consults the live channel.
    pub fn get_status_by_request_id(&self, request_id: &str) -> Result<Status> {
        self.store.by_request_id(&self.dag, request_id)
    }

    /// Overwrite the record of a finished run.
    pub async fn update_status(&self, status: &Status) -> Result<()> {
        validate_request_id(&status.request_id)?;

        if let Some(live) = self.client.status().await {
            if live.is_running() && live.request_id == status.request_id {
                return Err(DagrunError::ConflictingLiveRun(status.request_id.clone()));
            }
        }

        match self.store.update(&self.dag, status) {
            Err(e) if e.is_not_found() => Err(DagrunError::invalid_request_id(
                status.request_id.clone(),
                "no run with this id is recorded",
            )),
            other => other,
        }
    }

    /// The `n` most recent runs, most recent first.
    pub fn get_status_hist(&self, n: usize) -> Result<Vec<StatusFile>> {
        self.store.history(&self.dag, n)
    }

    /// Returns once the channel stops answering. The execution process
    /// writes its terminal record before closing the channel, and the
    /// address must be free before a new run can bind it.
    async fn wait_until_not_running(&self) {
        while let Some(live) = self.client.status().await {
            debug!(dag = %self.dag.name, request_id = %live.request_id, status = %live.status, "waiting for run to end");
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }
}

impl StatusSource for Controller {
    fn try_live(&self) -> impl Future<Output = Option<Status>> + Send {
        self.client.status()
    }

    fn read_durable(&self) -> Result<Status> {
        match self.store.latest(&self.dag) {
            Ok(mut status) => {
                status.settle_not_live();
                Ok(status)
            }
            Err(e) if e.is_not_found() => Ok(Status::placeholder(&self.dag)),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Step;

    fn controller(home: &Path) -> Controller {
        let dag = Dag::new_unchecked("ctl", home.join("ctl.toml"), vec![Step::new("a", "true")]);
        let mut settings = Settings::for_home(home);
        settings.socket_dir = home.join("sock");
        Controller::new(dag, &settings)
    }

    #[tokio::test]
    async fn never_run_dag_reports_placeholder() {
        let home = tempfile::tempdir().unwrap();
        let ctl = controller(home.path());

        let status = ctl.get_status().await.unwrap();
        assert_eq!(status.status, SchedulerStatus::None);
        assert_eq!(status.nodes.len(), 1);
        assert!(ctl.get_status_hist(5).unwrap().is_empty());
    }

    #[tokio::test]
    async fn stop_without_live_run_is_ok_repeatedly() {
        let home = tempfile::tempdir().unwrap();
        let ctl = controller(home.path());
        for _ in 0..3 {
            ctl.stop().await.unwrap();
        }
    }

    #[tokio::test]
    async fn orphaned_running_record_settles_to_none() {
        let home = tempfile::tempdir().unwrap();
        let ctl = controller(home.path());

        let started = chrono::Utc::now();
        let mut writer = ctl.store().open_writer(ctl.dag(), started, "orphan").unwrap();
        writer
            .write(&Status::new_run(ctl.dag(), "orphan", "", crate::models::Pid(4242), started))
            .unwrap();
        drop(writer);

        let status = ctl.get_status().await.unwrap();
        assert_eq!(status.request_id, "orphan");
        assert_eq!(status.status, SchedulerStatus::None);
        assert!(!status.pid.is_some());

        let stored = ctl.get_status_by_request_id("orphan").unwrap();
        assert_eq!(stored.status, SchedulerStatus::Running);
    }

    #[tokio::test]
    async fn update_of_unknown_or_malformed_id_is_invalid() {
        let home = tempfile::tempdir().unwrap();
        let ctl = controller(home.path());

        let mut status = Status::placeholder(ctl.dag());
        status.request_id = "ghost".to_string();
        assert!(matches!(
            ctl.update_status(&status).await,
            Err(DagrunError::InvalidRequestId { .. })
        ));

        status.request_id = String::new();
        assert!(matches!(
            ctl.update_status(&status).await,
            Err(DagrunError::InvalidRequestId { .. })
        ));
    }

    #[test]
    fn start_async_rejects_malformed_request_id() {
        let home = tempfile::tempdir().unwrap();
        let ctl = controller(home.path());
        let request = RunRequest {
            request_id: Some("../escape".to_string()),
            ..RunRequest::default()
        };
        assert!(matches!(
            ctl.start_async(Path::new("/bin/true"), request),
            Err(DagrunError::InvalidRequestId { .. })
        ));
    }
}
