// src/store/writer.rs

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use tracing::{debug, warn};

use crate::errors::{DagrunError, Result};
use crate::ident::validate_request_id;
use crate::models::Status;
use crate::store::locks::{self, RunLocks};
use crate::store::segment::{self, WRITER_LOCK_FILE};

/// Exclusive writer session for one run of one DAG.
///
/// While a `Writer` exists it holds the DAG's `.writer.lock`, so no second
/// writer can be opened for the same DAG from any process. The lock is
/// released by [`Writer::close`] or, on every other exit path, by `Drop`.
#[derive(Debug)]
pub struct Writer {
    path: PathBuf,
    request_id: String,
    file: File,
    session: File,
    run_lock: Arc<Mutex<()>>,
    closed: bool,
}

impl Writer {
    pub(crate) fn open(dir: &Path, started_at: DateTime<Utc>, request_id: &str) -> Result<Self> {
        validate_request_id(request_id)?;
        fs::create_dir_all(dir)?;

        let session = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(WRITER_LOCK_FILE))?;
        FileExt::try_lock_exclusive(&session).map_err(|e| {
            DagrunError::WriteOpenError(format!(
                "another writer is active for {} ({e})",
                dir.display()
            ))
        })?;
        record_owner(&session);

        let path = dir.join(segment::segment_file_name(started_at, request_id));
        if path.exists() {
            debug!(path = %path.display(), "reopening stale segment left by a previous writer");
        }
        let file = segment::open_for_append(&path)?;

        debug!(path = %path.display(), request_id, "status writer opened");

        Ok(Self {
            path,
            request_id: request_id.to_string(),
            run_lock: RunLocks::global().lock_for(dir, request_id),
            file,
            session,
            closed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Append `status` as the run's current record and flush it to disk.
    pub fn write(&mut self, status: &Status) -> Result<()> {
        if self.closed {
            return Err(DagrunError::WriteOpenError(format!(
                "writer for {} is closed",
                self.path.display()
            )));
        }
        if status.request_id != self.request_id {
            return Err(DagrunError::invalid_request_id(
                status.request_id.clone(),
                format!("writer is bound to run {}", self.request_id),
            ));
        }

        let _guard = locks::acquire(&self.run_lock);
        segment::append_record(&self.file, status)
    }

    /// Release the writer session.
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        FileExt::unlock(&self.session)?;
        debug!(path = %self.path.display(), "status writer closed");
        Ok(())
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(path = %self.path.display(), error = %e, "failed to release status writer");
        }
    }
}

/// Leave the owning pid in the lock file for diagnostics.
fn record_owner(mut session: &File) {
    let written = session
        .set_len(0)
        .and_then(|_| writeln!(session, "{}", std::process::id()));
    if let Err(e) = written {
        debug!(error = %e, "could not record writer pid");
    }
}
