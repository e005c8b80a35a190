// tests/controller_status.rs
//
// Status resolution and record updates, with a fake execution process
// answering the live-status channel.

use chrono::{TimeDelta, Utc};
use dagrun::config::Dag;
use dagrun::controller::Controller;
use dagrun::errors::DagrunError;
use dagrun::models::{Pid, Status};
use dagrun::types::{NodeStatus, SchedulerStatus};
use dagrun_test_utils::builders::{StatusBuilder, TestHome};
use dagrun_test_utils::fake_status_server::FakeStatusServer;
use dagrun_test_utils::init_tracing;

const DIAMOND: &str = r#"
params = "d1"

[step.a]
command = "true"

[step.b]
command = "true"
after = ["a"]

[step.c]
command = "true"
after = ["a"]

[step.d]
command = "true"
after = ["b", "c"]
"#;

/// Write `status` as the only record of a finished run.
fn record(ctl: &Controller, status: &Status) {
    let started = status.started_at.unwrap_or_else(Utc::now);
    let mut writer = ctl
        .store()
        .open_writer(ctl.dag(), started, &status.request_id)
        .unwrap();
    writer.write(status).unwrap();
    writer.close().unwrap();
}

fn setup() -> (TestHome, Dag, Controller) {
    init_tracing();
    let home = TestHome::new();
    let dag = home.dag("diamond", DIAMOND);
    let ctl = Controller::new(dag.clone(), &home.settings);
    (home, dag, ctl)
}

#[tokio::test]
async fn never_run_reports_placeholder() {
    let (_home, dag, ctl) = setup();

    let status = ctl.get_status().await.unwrap();
    assert_eq!(status.status, SchedulerStatus::None);
    assert_eq!(status.pid, Pid::NONE);
    assert_eq!(status.name, dag.name);
    assert_eq!(status.params, "d1");
    let names: Vec<_> = status.nodes.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c", "d"]);
    assert!(status.nodes.iter().all(|n| n.status == NodeStatus::NotStarted));

    assert_eq!(ctl.get_last_status().await.unwrap(), status);
    assert!(ctl.get_status_hist(5).unwrap().is_empty());
}

#[tokio::test]
async fn live_record_wins_over_durable_one() {
    let (_home, dag, ctl) = setup();

    let finished = StatusBuilder::new(&dag, "done-1")
        .status(SchedulerStatus::Success)
        .all_nodes(NodeStatus::Success)
        .build();
    record(&ctl, &finished);

    let running = StatusBuilder::new(&dag, "live-2")
        .status(SchedulerStatus::Running)
        .pid(4242)
        .node("a", NodeStatus::Running)
        .build();
    let server = FakeStatusServer::spawn(ctl.socket_addr(), running.clone()).await;

    assert_eq!(ctl.get_status().await.unwrap(), running);

    server.shutdown().await;
    assert_eq!(ctl.get_status().await.unwrap(), finished);
}

#[tokio::test]
async fn orphaned_running_record_is_not_reported_as_running() {
    let (_home, dag, ctl) = setup();

    let orphan = StatusBuilder::new(&dag, "crashed")
        .status(SchedulerStatus::Running)
        .pid(99999)
        .build();
    record(&ctl, &orphan);

    let status = ctl.get_status().await.unwrap();
    assert_eq!(status.request_id, "crashed");
    assert_eq!(status.status, SchedulerStatus::None);
    assert_eq!(status.pid, Pid::NONE);
}

#[tokio::test]
async fn history_is_newest_first_and_lookup_ignores_live() {
    let (_home, dag, ctl) = setup();
    let now = Utc::now();

    for (i, id) in ["r1", "r2", "r3"].iter().enumerate() {
        let st = StatusBuilder::new(&dag, id)
            .status(SchedulerStatus::Success)
            .started_at(now - TimeDelta::minutes(10 - i as i64))
            .build();
        record(&ctl, &st);
    }

    let hist = ctl.get_status_hist(2).unwrap();
    let ids: Vec<_> = hist.iter().map(|f| f.status.request_id.as_str()).collect();
    assert_eq!(ids, vec!["r3", "r2"]);

    // A live server with the same id does not affect historical lookup.
    let live = StatusBuilder::new(&dag, "r1").status(SchedulerStatus::Running).build();
    let server = FakeStatusServer::spawn(ctl.socket_addr(), live).await;
    assert_eq!(
        ctl.get_status_by_request_id("r1").unwrap().status,
        SchedulerStatus::Success
    );
    server.shutdown().await;

    assert!(ctl.get_status_by_request_id("nope").unwrap_err().is_not_found());
}

#[tokio::test]
async fn update_rewrites_finished_run() {
    let (_home, dag, ctl) = setup();

    let failed = StatusBuilder::new(&dag, "r1")
        .status(SchedulerStatus::Error)
        .node("a", NodeStatus::Success)
        .node("b", NodeStatus::Error)
        .node("c", NodeStatus::Success)
        .node("d", NodeStatus::Cancel)
        .build();
    record(&ctl, &failed);

    let mut fixed = failed.clone();
    fixed.node_mut("b").unwrap().set_status(NodeStatus::Success);
    fixed.set_status(SchedulerStatus::Success);
    ctl.update_status(&fixed).await.unwrap();

    assert_eq!(ctl.get_status_by_request_id("r1").unwrap(), fixed);
    assert_eq!(ctl.get_status().await.unwrap(), fixed);
}

#[tokio::test]
async fn update_of_live_run_is_refused() {
    let (_home, dag, ctl) = setup();

    let running = StatusBuilder::new(&dag, "r1").status(SchedulerStatus::Running).build();
    record(&ctl, &running);
    let server = FakeStatusServer::spawn(ctl.socket_addr(), running.clone()).await;

    let mut edited = running.clone();
    edited.node_mut("a").unwrap().set_status(NodeStatus::Success);
    let err = ctl.update_status(&edited).await.unwrap_err();
    assert!(matches!(err, DagrunError::ConflictingLiveRun(ref id) if id == "r1"), "got {err:?}");
    // The refused edit left the stored record alone.
    assert_eq!(ctl.get_status_by_request_id("r1").unwrap(), running);

    // Once the live run has finished the same update goes through.
    server.handler.set(
        StatusBuilder::new(&dag, "r1")
            .status(SchedulerStatus::Success)
            .build(),
    );
    ctl.update_status(&edited).await.unwrap();
    server.shutdown().await;

    assert_eq!(
        ctl.get_status_by_request_id("r1").unwrap().node("a").unwrap().status,
        NodeStatus::Success
    );
}

#[tokio::test]
async fn update_rejects_unknown_or_reshaped_records() {
    let (_home, dag, ctl) = setup();

    let unknown = StatusBuilder::new(&dag, "ghost").build();
    let err = ctl.update_status(&unknown).await.unwrap_err();
    assert!(matches!(err, DagrunError::InvalidRequestId { .. }), "got {err:?}");

    let done = StatusBuilder::new(&dag, "r1").status(SchedulerStatus::Success).build();
    record(&ctl, &done);

    let mut fewer = done.clone();
    fewer.nodes.pop();
    let err = ctl.update_status(&fewer).await.unwrap_err();
    assert!(matches!(err, DagrunError::InvalidRequestId { .. }), "got {err:?}");

    let mut renamed = done.clone();
    renamed.nodes[0].name = "zzz".to_string();
    let err = ctl.update_status(&renamed).await.unwrap_err();
    assert!(matches!(err, DagrunError::InvalidRequestId { .. }), "got {err:?}");

    let mut empty_id = done.clone();
    empty_id.request_id.clear();
    let err = ctl.update_status(&empty_id).await.unwrap_err();
    assert!(matches!(err, DagrunError::InvalidRequestId { .. }), "got {err:?}");

    // Nothing above touched the stored record.
    assert_eq!(ctl.get_status_by_request_id("r1").unwrap(), done);
}

#[tokio::test]
async fn stop_reaches_live_process_and_is_fine_without_one() {
    let (_home, dag, ctl) = setup();

    ctl.stop().await.unwrap();

    let running = StatusBuilder::new(&dag, "r1").status(SchedulerStatus::Running).build();
    let server = FakeStatusServer::spawn(ctl.socket_addr(), running).await;
    ctl.stop().await.unwrap();
    ctl.stop().await.unwrap();
    assert_eq!(server.handler.stops(), 2);
    server.shutdown().await;
}
