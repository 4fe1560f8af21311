// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for heartbeat discovery and the task session command channel

use ctrlink_session::*;
use ctrlink_transports::prelude::*;
use serde_json::{json, Value};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

const HEARTBEAT: &str = r#"{
    "status": "active",
    "taskstate": {"isRunning": true},
    "slavestates": {
        "slaverequestid-worker-1": {"currentsceneuri": "mujin:/cell.mujin.dae", "taskstate": {}}
    }
}"#;

/// Serve `replies` one request at a time, handing each request to the test
fn spawn_controller(
    port: u16,
    replies: Vec<&'static str>,
    ready: Arc<Barrier>,
    done: Arc<Barrier>,
) -> thread::JoinHandle<Vec<String>> {
    thread::spawn(move || {
        let mut server = ZmqRep::with_port(port).unwrap();
        server.start().unwrap();
        ready.wait();

        let mut requests = Vec::new();
        for reply in replies {
            let request = server.recv(Some(Duration::from_secs(5))).unwrap().unwrap();
            requests.push(String::from_utf8(request).unwrap());
            server.send(reply.as_bytes()).unwrap();
        }

        done.wait();
        server.stop().unwrap();
        requests
    })
}

/// A heartbeat port with no publisher exhausts a 5 x 100 ms budget in about half a second
#[test]
fn test_no_heartbeat_fails_after_budget() {
    let options = SessionOptions::new("127.0.0.1", 31200, 31201)
        .with_discovery(DiscoveryPolicy::new(5, Duration::from_millis(100)));

    let started = Instant::now();
    let err = match TaskSession::bootstrap(options) {
        Ok(_) => panic!("bootstrap succeeded without a heartbeat"),
        Err(e) => e,
    };
    let elapsed = started.elapsed();

    assert_eq!(err.code(), ErrorCode::NoResponse);
    assert_eq!(
        err.to_string(),
        "Failed to obtain heartbeat from tcp://127.0.0.1:31201. Is controller running?"
    );
    assert!(elapsed >= Duration::from_millis(450), "gave up early after {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(1500), "gave up late after {:?}", elapsed);
}

struct CountingSource {
    calls: usize,
}

impl HeartbeatSource for CountingSource {
    fn fetch(&mut self, _wait: Duration) -> SessionResult<Option<String>> {
        self.calls += 1;
        Ok(None)
    }

    fn endpoint(&self) -> String {
        "tcp://silent:1".to_string()
    }
}

/// Discovery makes exactly the configured number of attempts at the configured pace
#[test]
fn test_discovery_respects_attempt_budget() {
    let mut source = CountingSource { calls: 0 };
    let policy = DiscoveryPolicy::new(10, Duration::from_millis(20));

    let started = Instant::now();
    let err = discover_heartbeat(&mut source, &policy).unwrap_err();

    assert_eq!(source.calls, 10);
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert!(matches!(err, SessionError::NoHeartbeat { .. }));
}

/// Identity comes from a live publisher
#[test]
fn test_bootstrap_discovers_identity_from_publisher() {
    let mut publisher = HeartbeatPublisher::new(31203, Duration::from_millis(50), HEARTBEAT);
    publisher.start().unwrap();

    let options = SessionOptions::new("127.0.0.1", 31202, 31203)
        .with_discovery(DiscoveryPolicy::new(30, Duration::from_millis(100)));
    let session = TaskSession::bootstrap(options).unwrap();

    assert_eq!(
        session.identity(),
        &SessionIdentity::new("cell.mujin.dae", "worker-1")
    );
    assert_eq!(session.endpoint(), &Endpoint::new("127.0.0.1", 31202));

    publisher.stop();
}

/// A caller-supplied field wins over the heartbeat
#[test]
fn test_supplied_scene_pk_is_kept() {
    let mut publisher = HeartbeatPublisher::new(31205, Duration::from_millis(50), HEARTBEAT);
    publisher.start().unwrap();

    let options = SessionOptions::new("127.0.0.1", 31204, 31205)
        .with_scene_pk("override.mujin.dae")
        .with_discovery(DiscoveryPolicy::new(30, Duration::from_millis(100)));
    let session = TaskSession::bootstrap(options).unwrap();

    assert_eq!(session.identity().scene_pk, "override.mujin.dae");
    assert_eq!(session.identity().slave_request_id, "worker-1");

    publisher.stop();
}

/// Both ids supplied: no heartbeat needed, commands are routed through the envelope
#[test]
fn test_execute_command_against_controller() {
    let ready = Arc::new(Barrier::new(2));
    let done = Arc::new(Barrier::new(2));
    let controller = spawn_controller(
        31206,
        vec![r#"{"output": {"state": "idle"}}"#],
        Arc::clone(&ready),
        Arc::clone(&done),
    );

    let options = SessionOptions::new("127.0.0.1", 31206, 31207)
        .with_scene_pk("cell.mujin.dae")
        .with_slave_request_id("worker-1")
        .with_user_info(json!({"username": "operator", "locale": "en_US"}))
        .with_discovery(DiscoveryPolicy::new(1, Duration::from_millis(1)));
    let session = TaskSession::bootstrap(options).unwrap();
    ready.wait();

    let reply = session
        .execute_command(json!({"command": "GetState"}), Some(Duration::from_secs(5)))
        .unwrap();
    assert_eq!(reply["output"]["state"], "idle");

    done.wait();
    let requests = controller.join().unwrap();
    let request: Value = serde_json::from_str(&requests[0]).unwrap();
    assert_eq!(request["fnname"], "RunCommand");
    assert_eq!(request["slaverequestid"], "worker-1");
    assert_eq!(request["userinfo"]["username"], "operator");
    assert_eq!(request["taskparams"]["tasktype"], "realtimeitlplanning");
    assert_eq!(request["taskparams"]["sceneparams"]["scenepk"], "cell.mujin.dae");
    assert_eq!(request["taskparams"]["taskparameters"]["command"], "GetState");
}

/// Controller-reported errors surface as CommandFailed
#[test]
fn test_controller_error_becomes_command_failed() {
    let ready = Arc::new(Barrier::new(2));
    let done = Arc::new(Barrier::new(2));
    let controller = spawn_controller(
        31208,
        vec![r#"{"error": {"errorcode": "InvalidCommand", "description": "GetStat is not a command"}}"#],
        Arc::clone(&ready),
        Arc::clone(&done),
    );

    let options = SessionOptions::new("127.0.0.1", 31208, 31209)
        .with_scene_pk("cell.mujin.dae")
        .with_slave_request_id("worker-1");
    let session = TaskSession::bootstrap(options).unwrap();
    ready.wait();

    let err = session
        .execute_command(json!({"command": "GetStat"}), Some(Duration::from_secs(5)))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::CommandFailed);
    assert!(err.to_string().contains("GetStat is not a command"));

    done.wait();
    controller.join().unwrap();
}

/// An empty reply is NoResponse; the rebuilt client keeps working
#[test]
fn test_empty_reply_rebuilds_client() {
    let ready = Arc::new(Barrier::new(2));
    let done = Arc::new(Barrier::new(2));
    let controller = spawn_controller(
        31210,
        vec!["", "pong"],
        Arc::clone(&ready),
        Arc::clone(&done),
    );

    let options = SessionOptions::new("127.0.0.1", 31210, 31211)
        .with_scene_pk("cell.mujin.dae")
        .with_slave_request_id("worker-1");
    let session = TaskSession::bootstrap(options).unwrap();
    ready.wait();

    let err = session
        .execute_raw("ping", Some(Duration::from_secs(5)))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NoResponse);

    let reply = session.execute_raw("ping", Some(Duration::from_secs(5))).unwrap();
    assert_eq!(reply, "pong");

    done.wait();
    controller.join().unwrap();
}

/// Timeouts carry the command and are not swallowed
#[test]
fn test_command_timeout_propagates() {
    let options = SessionOptions::new("127.0.0.1", 31212, 31213)
        .with_scene_pk("cell.mujin.dae")
        .with_slave_request_id("worker-1");
    let session = TaskSession::bootstrap(options).unwrap();

    let err = session
        .execute_raw("{\"command\": \"GetState\"}", Some(Duration::from_millis(200)))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Timeout);
    assert!(err.to_string().contains("GetState"));
}

/// A monitor keeps the latest live heartbeat and asks for reinitialization once it goes stale
#[test]
fn test_monitor_tracks_liveness() {
    let context = zmq::Context::new();
    let mut publisher = HeartbeatPublisher::new(31214, Duration::from_millis(20), HEARTBEAT)
        .with_context(context.clone());
    publisher.start().unwrap();

    let monitor = HeartbeatMonitor::start(
        context.clone(),
        Endpoint::new("127.0.0.1", 31214),
        Some(Duration::from_millis(300)),
    )
    .unwrap();

    let deadline = Instant::now() + Duration::from_secs(3);
    while monitor.latest().is_none() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
    assert!(monitor.latest().is_some_and(|heartbeat| is_alive_heartbeat(&heartbeat)));
    assert!(!monitor.take_reinitialize_request());

    publisher.set_payload(r#"{"status": "lost"}"#);
    let deadline = Instant::now() + Duration::from_secs(3);
    let mut requested = false;
    while Instant::now() < deadline {
        if monitor.take_reinitialize_request() {
            requested = true;
            break;
        }
        thread::sleep(Duration::from_millis(20));
    }
    assert!(requested);
    assert_eq!(slave_request_id_from_heartbeat(&monitor.latest().unwrap()), "worker-1");

    drop(monitor);
    publisher.stop();
}

/// Retried bootstrap gives up once the strategy is exhausted
#[test]
fn test_connect_with_retry_gives_up() {
    let options = SessionOptions::new("127.0.0.1", 31215, 31216)
        .with_discovery(DiscoveryPolicy::new(1, Duration::from_millis(50)));
    let mut strategy = ReconnectionStrategy::new(Duration::from_millis(10), 2);

    let err = match TaskSession::connect_with_retry(options, &mut strategy) {
        Ok(_) => panic!("bootstrap succeeded without a heartbeat"),
        Err(e) => e,
    };
    assert!(matches!(err, SessionError::NoHeartbeat { .. }));
    assert!(strategy.is_exhausted());
}
