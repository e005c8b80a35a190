// src/lib.rs

pub mod agent;
pub mod cli;
pub mod config;
pub mod controller;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod ident;
pub mod logging;
pub mod models;
pub mod sock;
pub mod store;
pub mod types;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::agent::RunOptions;
use crate::cli::{CliArgs, Command};
use crate::config::{Dag, Settings, load_dag};
use crate::controller::Controller;
use crate::models::Status;
use crate::types::SchedulerStatus;

/// High-level entry point used by `main.rs`.
///
/// `start` runs the DAG in this process; every other command goes through
/// the lifecycle controller.
pub async fn run(args: CliArgs) -> Result<ExitCode> {
    let settings = Settings::load(args.home.as_deref())?;
    debug!(?settings, "settings resolved");

    match args.command {
        Command::Start {
            dag,
            params,
            request_id,
        } => {
            let dag = load_dag(&dag)?;
            let options = RunOptions { request_id, params };
            let status = agent::run_dag(&dag, &settings, options, interrupted()).await?;
            println!("{}", status.request_id);
            Ok(exit_code_for(&status))
        }
        Command::Status { dag } => {
            let status = controller_for(&dag, &settings)?.get_status().await?;
            print_json(&status)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Stop { dag } => {
            controller_for(&dag, &settings)?.stop().await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Restart { dag, params } => {
            let ctl = controller_for(&dag, &settings)?;
            let request_id = ctl.restart(&self_exe()?, params).await?;
            println!("{request_id}");
            Ok(ExitCode::SUCCESS)
        }
        Command::Retry { dag, request_id } => {
            let ctl = controller_for(&dag, &settings)?;
            let new_id = ctl.retry(&self_exe()?, &request_id).await?;
            println!("{new_id}");
            Ok(ExitCode::SUCCESS)
        }
        Command::History { dag, limit } => {
            let runs = controller_for(&dag, &settings)?.get_status_hist(limit)?;
            let statuses: Vec<&Status> = runs.iter().map(|f| &f.status).collect();
            print_json(&statuses)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::DryRun { dag } => {
            print_dry_run(&load_dag(&dag)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn controller_for(path: &Path, settings: &Settings) -> Result<Controller> {
    let dag = load_dag(path).with_context(|| format!("loading DAG {}", path.display()))?;
    Ok(Controller::new(dag, settings))
}

/// The binary spawned for new runs: this one.
fn self_exe() -> Result<PathBuf> {
    std::env::current_exe().context("locating the dagrun executable")
}

fn exit_code_for(status: &Status) -> ExitCode {
    if status.status == SchedulerStatus::Error {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Resolves on Ctrl-C or SIGTERM.
async fn interrupted() {
    let mut term = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            warn!(error = %e, "failed to listen for SIGTERM");
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
            return;
        }
    };

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                warn!(error = %e, "failed to listen for Ctrl+C");
                term.recv().await;
            }
        }
        _ = term.recv() => {}
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Simple dry-run output: print steps, deps and commands.
fn print_dry_run(dag: &Dag) {
    println!("dagrun dry-run");
    println!("  name = {}", dag.name);
    println!("  location = {}", dag.location.display());
    if let Some(description) = &dag.description {
        println!("  description = {description}");
    }
    println!("  params = {:?}", dag.default_params);
    println!("  restart_wait = {:?}", dag.restart_wait);
    println!();

    println!("steps ({}):", dag.steps.len());
    for step in &dag.steps {
        println!("  - {}", step.name);
        println!("      command: {}", step.command);
        if !step.after.is_empty() {
            println!("      after: {:?}", step.after);
        }
        if let Some(dir) = &step.dir {
            println!("      dir: {}", dir.display());
        }
        if let Some(precondition) = &step.precondition {
            println!("      precondition: {precondition}");
        }
    }

    debug!("dry-run complete (no execution)");
}
