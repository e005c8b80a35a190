// src/ident.rs

//! Run identifiers and per-DAG addressing.
//!
//! Everything here is a pure function of its inputs (apart from
//! [`new_request_id`], which is random) so it can be tested without touching
//! the filesystem or sockets.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use blake3::Hasher;
use regex::Regex;
use uuid::Uuid;

use crate::errors::{DagrunError, Result};

/// Hex characters of the location hash kept in addresses and directory names.
const LOCATION_HASH_LEN: usize = 24;

/// Longest name fragment kept in a socket file name. Unix socket paths are
/// limited to ~104 bytes on some platforms, so the name is bounded and the
/// hash carries the uniqueness.
const MAX_SOCKET_NAME_LEN: usize = 24;

static REQUEST_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,127}$").expect("request id pattern is valid")
});

/// Fresh request id for a new run.
pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Request ids end up in file names, so they are restricted to a safe
/// alphabet.
pub fn validate_request_id(request_id: &str) -> Result<()> {
    if request_id.is_empty() {
        return Err(DagrunError::invalid_request_id(request_id, "request id is empty"));
    }
    if !REQUEST_ID_RE.is_match(request_id) {
        return Err(DagrunError::invalid_request_id(
            request_id,
            "expected 1-128 characters from [A-Za-z0-9._-], starting with an alphanumeric",
        ));
    }
    Ok(())
}

/// Stable hash of a DAG's canonical location.
pub fn location_hash(location: &Path) -> String {
    let mut hasher = Hasher::new();
    hasher.update(location.as_os_str().as_encoded_bytes());
    let hex = hasher.finalize().to_hex();
    hex.as_str()[..LOCATION_HASH_LEN].to_string()
}

/// Name fragment that is safe in file names.
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() { "dag".to_string() } else { cleaned }
}

/// Channel address for a DAG.
///
/// The address only depends on `socket_dir`, the DAG name and its canonical
/// location, so a controller and an execution process started at different
/// times agree on it.
pub fn socket_addr(socket_dir: &Path, name: &str, location: &Path) -> PathBuf {
    let mut short = sanitize_name(name);
    short.truncate(MAX_SOCKET_NAME_LEN);
    socket_dir.join(format!("@dagrun-{}-{}.sock", short, location_hash(location)))
}

/// Directory name of a DAG's history inside the store.
pub fn store_dir_name(name: &str, location: &Path) -> String {
    format!("{}-{}", sanitize_name(name), location_hash(location))
}
