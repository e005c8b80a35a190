#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dagrun::config::{Dag, Settings, load_dag};
use dagrun::models::{Pid, Status};
use dagrun::types::{NodeStatus, SchedulerStatus};
use tempfile::TempDir;

/// Isolated home, store and socket directory for one test.
///
/// The socket directory lives directly under `/tmp` so socket paths stay
/// well below the platform limit even when `TMPDIR` is long.
pub struct TestHome {
    home: TempDir,
    _sockets: TempDir,
    pub settings: Settings,
}

impl TestHome {
    pub fn new() -> Self {
        let home = tempfile::tempdir().expect("create home dir");
        let sockets = tempfile::Builder::new()
            .prefix("dr")
            .tempdir_in("/tmp")
            .expect("create socket dir");

        let mut settings = Settings::for_home(home.path());
        settings.socket_dir = sockets.path().to_path_buf();
        settings.status_timeout = Duration::from_millis(500);
        settings.poll_interval = Duration::from_millis(50);

        Self {
            home,
            _sockets: sockets,
            settings,
        }
    }

    pub fn path(&self) -> &Path {
        self.home.path()
    }

    /// Write `dags/<file_stem>.toml` and load it.
    pub fn dag(&self, file_stem: &str, toml: &str) -> Dag {
        load_dag(self.write_dag(file_stem, toml)).expect("test DAG should be valid")
    }

    pub fn write_dag(&self, file_stem: &str, toml: &str) -> PathBuf {
        let dir = self.home.path().join("dags");
        fs::create_dir_all(&dir).expect("create dags dir");
        let file = dir.join(format!("{file_stem}.toml"));
        fs::write(&file, toml).expect("write DAG file");
        file
    }
}

impl Default for TestHome {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `Status` records of a given DAG.
pub struct StatusBuilder {
    status: Status,
}

impl StatusBuilder {
    pub fn new(dag: &Dag, request_id: &str) -> Self {
        Self {
            status: Status::new_run(dag, request_id, dag.default_params.clone(), Pid::NONE, Utc::now()),
        }
    }

    pub fn status(mut self, status: SchedulerStatus) -> Self {
        self.status.set_status(status);
        self
    }

    pub fn pid(mut self, pid: i32) -> Self {
        self.status.pid = Pid(pid);
        self
    }

    pub fn params(mut self, params: &str) -> Self {
        self.status.params = params.to_string();
        self
    }

    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.status.started_at = Some(at);
        self
    }

    pub fn node(mut self, name: &str, status: NodeStatus) -> Self {
        if let Some(node) = self.status.node_mut(name) {
            node.set_status(status);
        }
        self
    }

    /// Every node set to `status`.
    pub fn all_nodes(mut self, status: NodeStatus) -> Self {
        for node in &mut self.status.nodes {
            node.set_status(status);
        }
        self
    }

    pub fn build(self) -> Status {
        self.status
    }
}
