// src/agent/mod.rs

//! The execution process for one run of a DAG.
//!
//! While the run is live this process owns the in-memory record, answers the
//! live-status channel and is the only writer of the run's store segment.
//! The terminal record is written and the writer closed before the channel
//! goes away, so a caller that finds no live server can trust the store.

pub mod live;

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::config::{Dag, Settings};
use crate::dag::Scheduler;
use crate::engine::{CoreRuntime, Runtime, RuntimeEvent};
use crate::errors::Result;
use crate::exec::{ExecutorBackend, RealExecutorBackend, StepEnv};
use crate::ident::{new_request_id, socket_addr, validate_request_id};
use crate::models::{Pid, Status};
use crate::sock::SockServer;
use crate::store::StatusStore;

pub use live::{LiveRun, RecordSink};

/// How this run was requested.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// `None` generates a fresh id.
    pub request_id: Option<String>,
    /// `None` uses the DAG's default params.
    pub params: Option<String>,
}

/// Run `dag` in this process with real step processes.
///
/// `interrupt` resolving counts as a stop request.
pub async fn run_dag<F>(dag: &Dag, settings: &Settings, options: RunOptions, interrupt: F) -> Result<Status>
where
    F: Future<Output = ()> + Send + 'static,
{
    run_dag_with(dag, settings, options, interrupt, RealExecutorBackend::new).await
}

/// [`run_dag`] with a caller-provided executor.
pub async fn run_dag_with<E, M, F>(
    dag: &Dag,
    settings: &Settings,
    options: RunOptions,
    interrupt: F,
    make_executor: M,
) -> Result<Status>
where
    E: ExecutorBackend,
    M: FnOnce(mpsc::Sender<RuntimeEvent>, StepEnv) -> E,
    F: Future<Output = ()> + Send + 'static,
{
    let request_id = options.request_id.unwrap_or_else(new_request_id);
    validate_request_id(&request_id)?;
    let params = options
        .params
        .unwrap_or_else(|| dag.default_params.clone());

    let addr = socket_addr(&settings.socket_dir, &dag.name, &dag.location);
    let server = SockServer::bind(&addr).await?;

    let store = StatusStore::new(&settings.data_dir);
    let started_at = Utc::now();
    let mut writer = store.open_writer(dag, started_at, &request_id)?;
    let initial = Status::new_run(dag, &request_id, &params, Pid::current(), started_at);
    writer.write(&initial)?;

    info!(
        dag = %dag.name,
        request_id = %request_id,
        params = %params,
        addr = %addr.display(),
        "run started"
    );

    let (event_tx, event_rx) = mpsc::channel::<RuntimeEvent>(64);
    let live = LiveRun::new(initial);
    let stop_rx = live.stop_signal();

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server_task = tokio::spawn(server.serve(Arc::clone(&live), async move {
        let _ = shutdown_rx.await;
    }));

    let interrupt_task = {
        let live = Arc::clone(&live);
        tokio::spawn(async move {
            interrupt.await;
            info!("interrupted; stopping run");
            live.request_stop();
        })
    };

    let env = StepEnv {
        base_dir: dag.base_dir(),
        request_id: request_id.clone(),
        params,
    };
    let executor = make_executor(event_tx, env);
    let core = CoreRuntime::new(Scheduler::from_dag(dag));
    let sink = RecordSink::new(Arc::clone(&live), writer);

    let outcome = Runtime::new(core, event_rx, stop_rx, executor, sink).run().await;
    interrupt_task.abort();

    // The runtime (and with it the writer) is gone; only now stop answering.
    let _ = shutdown_tx.send(());
    match server_task.await {
        Ok(Err(e)) => warn!(error = %e, "status server failed"),
        Err(e) => warn!(error = %e, "status server task panicked"),
        Ok(Ok(())) => {}
    }

    let final_status = outcome?;
    info!(dag = %dag.name, request_id = %request_id, status = %final_status, "run finished");

    let retention = dag
        .hist_retention_days
        .unwrap_or(settings.hist_retention_days);
    if let Err(e) = store.remove_old(dag, retention) {
        warn!(dag = %dag.name, error = %e, "could not prune old status records");
    }

    Ok(live.snapshot())
}
