// src/store/mod.rs

//! Durable history of status records, one directory per DAG.
//!
//! - [`segment`] defines the file layout and the append/read primitives.
//! - [`writer`] is the exclusive writer session an execution process holds
//!   for the lifetime of its run.
//! - [`locks`] serializes same-run appends inside one process.

pub mod locks;
pub mod segment;
pub mod writer;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, warn};

use crate::config::model::Dag;
use crate::errors::{DagrunError, Result};
use crate::ident::{store_dir_name, validate_request_id};
use crate::models::{Status, StatusFile};

pub use locks::RunLocks;
pub use writer::Writer;

#[derive(Debug, Clone)]
pub struct StatusStore {
    root: PathBuf,
}

impl StatusStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every segment of `dag`.
    pub fn dag_dir(&self, dag: &Dag) -> PathBuf {
        self.root.join(store_dir_name(&dag.name, &dag.location))
    }

    /// Begin the segment of a new run. Fails with `WriteOpenError` while
    /// another writer for the same DAG is open.
    pub fn open_writer(
        &self,
        dag: &Dag,
        started_at: DateTime<Utc>,
        request_id: &str,
    ) -> Result<Writer> {
        Writer::open(&self.dag_dir(dag), started_at, request_id)
    }

    /// Current record of the most recently started run.
    pub fn latest(&self, dag: &Dag) -> Result<Status> {
        for path in segment::list_segments(&self.dag_dir(dag))? {
            match segment::read_last(&path) {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => debug!(path = %path.display(), "segment has no record yet"),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable segment"),
            }
        }
        Err(DagrunError::NotFound(format!("no runs recorded for DAG '{}'", dag.name)))
    }

    /// Locate a run by request id using the segment names only.
    pub fn find_by_request_id(&self, dag: &Dag, request_id: &str) -> Result<StatusFile> {
        validate_request_id(request_id)?;

        for path in segment::list_segments(&self.dag_dir(dag))? {
            if segment::segment_request_id(&path) != Some(request_id) {
                continue;
            }
            if let Some(status) = segment::read_last(&path)? {
                if status.request_id == request_id {
                    return Ok(StatusFile { file: path, status });
                }
            }
        }

        Err(DagrunError::NotFound(format!(
            "run {} is not recorded for DAG '{}'",
            request_id, dag.name
        )))
    }

    pub fn by_request_id(&self, dag: &Dag, request_id: &str) -> Result<Status> {
        self.find_by_request_id(dag, request_id).map(|f| f.status)
    }

    /// Replace the current record of an existing run.
    ///
    /// Only node statuses (and the run status derived from them) may change:
    /// the node list must match the stored one in length and names, and the
    /// parameters must be unchanged.
    pub fn update(&self, dag: &Dag, status: &Status) -> Result<()> {
        validate_request_id(&status.request_id)?;

        // Held across lookup, shape check and append.
        let lock = RunLocks::global().lock_for(&self.dag_dir(dag), &status.request_id);
        let _guard = locks::acquire(&lock);

        let existing = self.find_by_request_id(dag, &status.request_id)?;
        ensure_same_shape(&existing.status, status)?;

        let file = segment::open_for_append(&existing.file)?;
        segment::append_record(&file, status)?;

        info!(
            dag = %dag.name,
            request_id = %status.request_id,
            status = %status.status,
            "status record updated"
        );
        Ok(())
    }

    /// The `n` most recently started runs, most recent first.
    pub fn history(&self, dag: &Dag, n: usize) -> Result<Vec<StatusFile>> {
        let mut out = Vec::with_capacity(n);
        if n == 0 {
            return Ok(out);
        }

        for path in segment::list_segments(&self.dag_dir(dag))? {
            match segment::read_last(&path) {
                Ok(Some(status)) => out.push(StatusFile { file: path, status }),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable segment"),
            }
            if out.len() == n {
                break;
            }
        }
        Ok(out)
    }

    /// Delete segments of runs that started more than `retention_days` ago.
    /// A retention of zero keeps everything.
    pub fn remove_old(&self, dag: &Dag, retention_days: u32) -> Result<usize> {
        if retention_days == 0 {
            return Ok(0);
        }
        let cutoff = Utc::now() - TimeDelta::days(i64::from(retention_days));

        let mut removed = 0;
        for path in segment::list_segments(&self.dag_dir(dag))? {
            let expired = segment::segment_started_at(&path).is_some_and(|ts| ts < cutoff);
            if expired {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }

        if removed > 0 {
            info!(dag = %dag.name, removed, retention_days, "removed expired run history");
        }
        Ok(removed)
    }
}

fn ensure_same_shape(existing: &Status, incoming: &Status) -> Result<()> {
    let reject = |reason: String| Err(DagrunError::invalid_request_id(incoming.request_id.clone(), reason));

    if existing.nodes.len() != incoming.nodes.len() {
        return reject(format!(
            "node count changed from {} to {}",
            existing.nodes.len(),
            incoming.nodes.len()
        ));
    }
    if let Some((old, new)) = existing
        .nodes
        .iter()
        .zip(incoming.nodes.iter())
        .find(|(old, new)| old.name != new.name)
    {
        return reject(format!("node '{}' does not match stored node '{}'", new.name, old.name));
    }
    if existing.params != incoming.params {
        return reject("params of a recorded run cannot change".to_string());
    }
    Ok(())
}
