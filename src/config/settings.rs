// src/config/settings.rs

//! Process-wide settings.
//!
//! Resolution order for the home directory:
//! 1. `--home` CLI flag
//! 2. `DAGRUN_HOME` environment variable
//! 3. `~/.dagrun`
//!
//! `<home>/settings.toml` is optional. `DAGRUN_DATA_DIR` and
//! `DAGRUN_SOCKET_DIR` override the corresponding file values.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::errors::Result;

pub const HOME_ENV: &str = "DAGRUN_HOME";
pub const DATA_DIR_ENV: &str = "DAGRUN_DATA_DIR";
pub const SOCKET_DIR_ENV: &str = "DAGRUN_SOCKET_DIR";

const SETTINGS_FILE: &str = "settings.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub home: PathBuf,
    /// Root of the status store.
    pub data_dir: PathBuf,
    /// Directory holding the per-DAG channel sockets.
    pub socket_dir: PathBuf,
    /// Upper bound for one live-status request (connect + response).
    pub status_timeout: Duration,
    /// Poll interval used while waiting for a run to leave `Running`.
    pub poll_interval: Duration,
    pub hist_retention_days: u32,
}

/// `settings.toml` as written by users. Every key is optional.
#[derive(Debug, Clone, Deserialize, Default)]
struct RawSettings {
    #[serde(default)]
    data_dir: Option<PathBuf>,
    #[serde(default)]
    socket_dir: Option<PathBuf>,
    #[serde(default)]
    status_timeout_ms: Option<u64>,
    #[serde(default)]
    poll_interval_ms: Option<u64>,
    #[serde(default)]
    hist_retention_days: Option<u32>,
}

impl Settings {
    /// Defaults for a given home directory, ignoring files and environment.
    pub fn for_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self {
            data_dir: home.join("data"),
            socket_dir: std::env::temp_dir(),
            status_timeout: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(100),
            hist_retention_days: 30,
            home,
        }
    }

    /// Resolve settings from the CLI override, environment and settings file.
    pub fn load(home_override: Option<&Path>) -> Result<Self> {
        let home = match home_override {
            Some(h) => h.to_path_buf(),
            None => match std::env::var_os(HOME_ENV) {
                Some(h) if !h.is_empty() => PathBuf::from(h),
                _ => dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".dagrun"),
            },
        };

        let mut settings = Settings::for_home(&home);

        let file = home.join(SETTINGS_FILE);
        if file.is_file() {
            debug!(path = %file.display(), "loading settings file");
            let raw: RawSettings = toml::from_str(&fs::read_to_string(&file)?)?;
            settings.apply(raw);
        }

        if let Some(dir) = non_empty_env(DATA_DIR_ENV) {
            settings.data_dir = dir;
        }
        if let Some(dir) = non_empty_env(SOCKET_DIR_ENV) {
            settings.socket_dir = dir;
        }

        Ok(settings)
    }

    fn apply(&mut self, raw: RawSettings) {
        if let Some(dir) = raw.data_dir {
            self.data_dir = self.home.join(dir);
        }
        if let Some(dir) = raw.socket_dir {
            self.socket_dir = dir;
        }
        if let Some(ms) = raw.status_timeout_ms {
            self.status_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = raw.poll_interval_ms {
            self.poll_interval = Duration::from_millis(ms);
        }
        if let Some(days) = raw.hist_retention_days {
            self.hist_retention_days = days;
        }
    }

    /// Environment a spawned execution process needs to agree with us on
    /// store location and channel address.
    pub fn child_env(&self) -> Vec<(&'static str, OsString)> {
        vec![
            (HOME_ENV, self.home.clone().into_os_string()),
            (DATA_DIR_ENV, self.data_dir.clone().into_os_string()),
            (SOCKET_DIR_ENV, self.socket_dir.clone().into_os_string()),
        ]
    }
}

fn non_empty_env(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
