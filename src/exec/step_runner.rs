// src/exec/step_runner.rs

//! Individual step process runner.

use std::future::Future;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::dag::ScheduledStep;
use crate::engine::{RuntimeEvent, StepOutcome};
use crate::exec::{PARAMS_ENV, REQUEST_ID_ENV, StepEnv};
use crate::models::split_params;

/// Run one step and report exactly one `StepCompleted` event for it.
///
/// - A precondition that exits non-zero reports `Skipped`.
/// - If the cancel channel fires, the child is killed and `Canceled` is
///   reported.
/// - Spawn failures report `Failed(-1)` with the error text.
pub async fn run_step(
    step: ScheduledStep,
    env: Arc<StepEnv>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    cancel_rx: oneshot::Receiver<()>,
) {
    let name = step.name.clone();
    let (outcome, error) = match run_step_inner(&step, &env, cancel_rx).await {
        Ok(StepOutcome::Failed(code)) => (StepOutcome::Failed(code), Some(format!("exit status {code}"))),
        Ok(outcome) => (outcome, None),
        Err(err) => {
            error!(step = %name, error = %err, "step execution error");
            (StepOutcome::Failed(-1), Some(format!("{err:#}")))
        }
    };

    let event = RuntimeEvent::StepCompleted {
        step: name.clone(),
        outcome,
        error,
    };
    if runtime_tx.send(event).await.is_err() {
        debug!(step = %name, "runtime gone before step completion was delivered");
    }
}

async fn run_step_inner(
    step: &ScheduledStep,
    env: &StepEnv,
    cancel_rx: oneshot::Receiver<()>,
) -> Result<StepOutcome> {
    // A dropped sender is not a cancellation; only an explicit send is.
    let cancel = async move {
        if cancel_rx.await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    tokio::pin!(cancel);

    if let Some(precondition) = &step.precondition {
        let mut child = shell(precondition, step, env)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("spawning precondition of step '{}'", step.name))?;

        match wait_or_cancel(&mut child, &mut cancel).await {
            Some(status) => {
                let status = status.with_context(|| format!("waiting for precondition of step '{}'", step.name))?;
                if !status.success() {
                    info!(step = %step.name, precondition = %precondition, "precondition not met; skipping step");
                    return Ok(StepOutcome::Skipped);
                }
            }
            None => return Ok(kill_canceled(&mut child, &step.name).await),
        }
    }

    info!(step = %step.name, command = %step.command, "starting step process");

    let mut child = shell(&step.command, step, env)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("spawning process for step '{}'", step.name))?;

    forward_output(&mut child, &step.name);

    match wait_or_cancel(&mut child, &mut cancel).await {
        Some(status) => {
            let status = status.with_context(|| format!("waiting for process of step '{}'", step.name))?;
            let code = status.code().unwrap_or(-1);
            info!(step = %step.name, exit_code = code, success = status.success(), "step process exited");
            Ok(if status.success() {
                StepOutcome::Success
            } else {
                StepOutcome::Failed(code)
            })
        }
        None => Ok(kill_canceled(&mut child, &step.name).await),
    }
}

/// `sh -c <script> <step name> <params...>`, so params are `$1..$n`.
fn shell(script: &str, step: &ScheduledStep, env: &StepEnv) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(script)
        .arg(&step.name)
        .args(split_params(&env.params))
        .current_dir(env.working_dir(step.dir.as_deref()))
        .env(PARAMS_ENV, &env.params)
        .env(REQUEST_ID_ENV, &env.request_id)
        .stdin(Stdio::null())
        .kill_on_drop(true);
    cmd
}

/// `None` when cancellation won the race.
async fn wait_or_cancel<F>(child: &mut Child, cancel: &mut std::pin::Pin<&mut F>) -> Option<std::io::Result<ExitStatus>>
where
    F: Future<Output = ()>,
{
    tokio::select! {
        status = child.wait() => Some(status),
        _ = cancel.as_mut() => None,
    }
}

async fn kill_canceled(child: &mut Child, step: &str) -> StepOutcome {
    info!(step = %step, "cancellation requested; killing step process");
    if let Err(e) = child.kill().await {
        warn!(step = %step, error = %e, "failed to kill step process");
    }
    StepOutcome::Canceled
}

/// Drain stdout and stderr into the log so pipes never fill up.
fn forward_output(child: &mut Child, step: &str) {
    if let Some(stdout) = child.stdout.take() {
        let step = step.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(step = %step, "stdout: {}", line);
            }
        });
    }

    if let Some(stderr) = child.stderr.take() {
        let step = step.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(step = %step, "stderr: {}", line);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;

    fn env(dir: &std::path::Path, params: &str) -> Arc<StepEnv> {
        Arc::new(StepEnv {
            base_dir: dir.to_path_buf(),
            request_id: "req-7".to_string(),
            params: params.to_string(),
        })
    }

    fn scheduled(name: &str, command: &str) -> ScheduledStep {
        ScheduledStep {
            name: name.to_string(),
            command: command.to_string(),
            dir: None,
            precondition: None,
        }
    }

    async fn run(step: ScheduledStep, env: Arc<StepEnv>) -> RuntimeEvent {
        let (tx, mut rx) = mpsc::channel(4);
        let (_cancel_tx, cancel_rx) = oneshot::channel();
        run_step(step, env, tx, cancel_rx).await;
        rx.recv().await.unwrap()
    }

    #[tokio::test]
    async fn params_and_env_reach_the_command() {
        let dir = tempfile::tempdir().unwrap();
        let step = scheduled(
            "write",
            "printf '%s|%s|%s' \"$1\" \"$DAGRUN_PARAMS\" \"$DAGRUN_REQUEST_ID\" > out.txt",
        );

        let event = run(step, env(dir.path(), "alpha beta")).await;
        assert!(matches!(event, RuntimeEvent::StepCompleted { outcome: StepOutcome::Success, .. }));

        let written = std::fs::read_to_string(dir.path().join("out.txt")).unwrap();
        assert_eq!(written, "alpha|alpha beta|req-7");
    }

    #[tokio::test]
    async fn non_zero_exit_is_failure_with_code() {
        let dir = tempfile::tempdir().unwrap();
        let event = run(scheduled("bad", "exit 3"), env(dir.path(), "")).await;
        match event {
            RuntimeEvent::StepCompleted { outcome, error, .. } => {
                assert_eq!(outcome, StepOutcome::Failed(3));
                assert_eq!(error.as_deref(), Some("exit status 3"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_precondition_skips_without_running() {
        let dir = tempfile::tempdir().unwrap();
        let mut step = scheduled("guarded", "touch ran");
        step.precondition = Some("test -f missing".to_string());

        let event = run(step, env(dir.path(), "")).await;
        assert!(matches!(event, RuntimeEvent::StepCompleted { outcome: StepOutcome::Skipped, .. }));
        assert!(!dir.path().join("ran").exists());
    }

    #[tokio::test]
    async fn cancel_kills_the_process() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::channel(4);
        let (cancel_tx, cancel_rx) = oneshot::channel();

        let task = tokio::spawn(run_step(scheduled("sleepy", "sleep 30"), env(dir.path(), ""), tx, cancel_rx));
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel_tx.send(()).unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, RuntimeEvent::StepCompleted { outcome: StepOutcome::Canceled, .. }));
        task.await.unwrap();
    }

    #[tokio::test]
    async fn missing_working_dir_is_reported_as_failure() {
        let mut step = scheduled("nowhere", "true");
        step.dir = Some(PathBuf::from("/definitely/not/here"));
        let event = run(step, env(std::path::Path::new("/"), "")).await;
        match event {
            RuntimeEvent::StepCompleted { outcome, error, .. } => {
                assert_eq!(outcome, StepOutcome::Failed(-1));
                assert!(error.unwrap().contains("nowhere"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
