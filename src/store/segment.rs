// src/store/segment.rs

//! On-disk layout of the status store.
//!
//! ```text
//! <data_dir>/<dag name>-<location hash>/
//!     .writer.lock
//!     20261019.081500.123.<request id>.dat
//!     20261019.093012.007.<request id>.dat
//! ```
//!
//! One segment per run, named by UTC start time and request id, so that
//! sorting file names sorts runs by start time and a run can be found by
//! file name alone. A segment holds one JSON document per line; the last
//! complete line is the run's current record.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use fs2::FileExt;
use tracing::debug;

use crate::errors::Result;
use crate::models::Status;

pub const SEGMENT_EXT: &str = "dat";
pub const WRITER_LOCK_FILE: &str = ".writer.lock";

const TIMESTAMP_FORMAT: &str = "%Y%m%d.%H%M%S%.3f";
/// Length of a formatted timestamp, e.g. `20261019.081500.123`.
const TIMESTAMP_LEN: usize = 19;

pub fn segment_file_name(started_at: DateTime<Utc>, request_id: &str) -> String {
    format!(
        "{}.{}.{}",
        started_at.format(TIMESTAMP_FORMAT),
        request_id,
        SEGMENT_EXT
    )
}

/// Split a segment file name into its start time and request id.
pub fn parse_segment_name(file_name: &str) -> Option<(DateTime<Utc>, &str)> {
    let stem = file_name.strip_suffix(SEGMENT_EXT)?.strip_suffix('.')?;
    if stem.len() <= TIMESTAMP_LEN + 1 || !stem.is_char_boundary(TIMESTAMP_LEN) {
        return None;
    }
    let (ts, rest) = stem.split_at(TIMESTAMP_LEN);
    let request_id = rest.strip_prefix('.')?;
    let naive = NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT).ok()?;
    Some((naive.and_utc(), request_id))
}

/// All segments in `dir`, most recent first. A missing directory simply has
/// no segments.
pub fn list_segments(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut segments = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_segment = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_segment_name)
            .is_some();
        if is_segment {
            segments.push(path);
        }
    }

    segments.sort_by(|a, b| b.file_name().cmp(&a.file_name()));
    Ok(segments)
}

/// Request id encoded in a segment path.
pub fn segment_request_id(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    parse_segment_name(name).map(|(_, id)| id)
}

pub fn segment_started_at(path: &Path) -> Option<DateTime<Utc>> {
    let name = path.file_name()?.to_str()?;
    parse_segment_name(name).map(|(ts, _)| ts)
}

/// Read the current record of a segment.
///
/// Returns `Ok(None)` for a segment that has no complete record yet. A torn
/// final line (writer died mid-append) is skipped in favour of the last
/// complete one.
pub fn read_last(path: &Path) -> Result<Option<Status>> {
    let mut file = File::open(path)?;
    FileExt::lock_shared(&file)?;
    let mut contents = String::new();
    let read = file.read_to_string(&mut contents);
    FileExt::unlock(&file)?;
    read?;

    for line in contents.lines().rev() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match Status::from_json(line.as_bytes()) {
            Ok(status) => return Ok(Some(status)),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "skipping unreadable record line");
            }
        }
    }
    Ok(None)
}

pub fn open_for_append(path: &Path) -> Result<File> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(file)
}

/// Append one record and make it durable before returning.
///
/// The exclusive file lock serializes appends from different processes; the
/// caller is expected to hold the in-process per-run lock as well.
pub fn append_record(file: &File, status: &Status) -> Result<()> {
    let mut line = status.to_json()?;
    line.push(b'\n');

    FileExt::lock_exclusive(file)?;
    let written = write_durably(file, &line);
    FileExt::unlock(file)?;
    written?;
    Ok(())
}

fn write_durably(mut file: &File, line: &[u8]) -> std::io::Result<()> {
    file.write_all(line)?;
    file.flush()?;
    file.sync_data()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn segment_names_round_trip_time_and_id() {
        let ts = Utc.with_ymd_and_hms(2026, 10, 19, 8, 15, 0).unwrap()
            + chrono::TimeDelta::milliseconds(123);
        let name = segment_file_name(ts, "abc-123.x");
        assert_eq!(name, "20261019.081500.123.abc-123.x.dat");

        let (parsed_ts, id) = parse_segment_name(&name).unwrap();
        assert_eq!(parsed_ts, ts);
        assert_eq!(id, "abc-123.x");
    }

    #[test]
    fn rejects_foreign_file_names() {
        assert!(parse_segment_name(".writer.lock").is_none());
        assert!(parse_segment_name("notes.dat").is_none());
        assert!(parse_segment_name("20261019.081500.123.dat").is_none());
        assert!(parse_segment_name("2026101x.081500.123.r.dat").is_none());
    }

    #[test]
    fn missing_directory_has_no_segments() {
        let dir = tempfile::tempdir().unwrap();
        let segments = list_segments(&dir.path().join("nope")).unwrap();
        assert!(segments.is_empty());
    }

    #[test]
    fn torn_last_line_falls_back_to_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("20261019.081500.123.r1.dat");
        fs::write(
            &path,
            "{\"requestId\":\"r1\",\"name\":\"n\",\"status\":1}\n{\"requestId\":\"r1\",\"na",
        )
        .unwrap();

        let status = read_last(&path).unwrap().unwrap();
        assert_eq!(status.request_id, "r1");
        assert_eq!(status.status, crate::types::SchedulerStatus::Running);
    }
}
