// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Event-loop behavior: leadership gating, alert processing with deferred
//! commits, scheduler-driven posting and server-pushed interval changes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use tokio::sync::{mpsc, oneshot, watch};

use ves_agent::agent::Agent;
use ves_agent::config::AgentConfig;
use ves_agent::convert::Alert;
use ves_agent::metrics::{Matrix, MetricsError, MetricsSource, QueryRange};
use ves_agent::rest::AlertMessage;
use ves_agent::AgentError;
use ves_collector::{ClientError, VesCollector};
use ves_event::{Batch, Event};
use ves_state::{
    AgentSnapshot, CommandOutput, ReplicatedLog, SingleNodeLog, StateCommand, StateError,
    StateStore,
};

struct FakeSource;

impl MetricsSource for FakeSource {
    async fn query_range(&self, _expr: &str, _range: &QueryRange) -> Result<Matrix, MetricsError> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
struct MockCollector {
    posted: Mutex<Vec<Event>>,
    fail_posts: AtomicU32,
    hb_subs: Mutex<Vec<mpsc::Sender<Duration>>>,
    meas_subs: Mutex<Vec<mpsc::Sender<Duration>>>,
}

impl MockCollector {
    fn posted(&self) -> Vec<Event> {
        self.posted.lock().unwrap().clone()
    }

    fn check_failure(&self) -> Result<(), ClientError> {
        let failed = self
            .fail_posts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            Err(ClientError::Http(hyper::StatusCode::SERVICE_UNAVAILABLE))
        } else {
            Ok(())
        }
    }
}

impl VesCollector for &MockCollector {
    async fn post_event(&self, event: Event) -> Result<(), ClientError> {
        self.check_failure()?;
        self.posted.lock().unwrap().push(event);
        Ok(())
    }

    async fn post_batch(&self, batch: Batch) -> Result<(), ClientError> {
        self.check_failure()?;
        self.posted.lock().unwrap().extend(batch);
        Ok(())
    }

    fn measurement_interval(&self) -> Duration {
        Duration::ZERO
    }

    fn heartbeat_interval(&self) -> Duration {
        Duration::ZERO
    }

    fn notify_measurement_interval_changed(&self, tx: mpsc::Sender<Duration>) {
        self.meas_subs.lock().unwrap().push(tx);
    }

    fn notify_heartbeat_interval_changed(&self, tx: mpsc::Sender<Duration>) {
        self.hb_subs.lock().unwrap().push(tx);
    }
}

/// A log whose leadership the test controls.
struct ControlledLog {
    inner: SingleNodeLog,
    leader_tx: watch::Sender<bool>,
}

impl ControlledLog {
    fn new(leader: bool) -> Self {
        let (leader_tx, _) = watch::channel(leader);
        ControlledLog {
            inner: SingleNodeLog::new(),
            leader_tx,
        }
    }
}

impl ReplicatedLog for ControlledLog {
    fn apply(&self, cmd: StateCommand) -> Result<CommandOutput, StateError> {
        if !self.is_leader() {
            return Err(StateError::NotLeader);
        }
        self.inner.apply(cmd)
    }

    fn snapshot(&self) -> AgentSnapshot {
        self.inner.snapshot()
    }

    fn restore(&self, snapshot: &AgentSnapshot) {
        self.inner.restore(snapshot)
    }

    fn leader_watch(&self) -> watch::Receiver<bool> {
        self.leader_tx.subscribe()
    }

    fn is_leader(&self) -> bool {
        *self.leader_tx.borrow()
    }

    fn stats(&self) -> serde_json::Value {
        self.inner.stats()
    }

    fn next_run(&self, sched: &str) -> Option<SystemTime> {
        self.inner.next_run(sched)
    }

    fn interval(&self, sched: &str) -> Duration {
        self.inner.interval(sched)
    }

    fn fault_id(&self, fault_name: &str) -> i32 {
        self.inner.fault_id(fault_name)
    }

    fn fault_sn(&self, fault_id: i32) -> i64 {
        self.inner.fault_sn(fault_id)
    }

    fn fault_start_epoch(&self, fault_id: i32) -> i64 {
        self.inner.fault_start_epoch(fault_id)
    }
}

fn test_config() -> AgentConfig {
    let mut config = AgentConfig::default();
    config.event.vnf_name = "hsxp5001".to_string();
    config.event.nf_naming_code = "hsxp".to_string();
    config.heartbeat.default_interval_secs = 5;
    config
}

fn firing_alert() -> Alert {
    serde_json::from_value(serde_json::json!({
        "status": "firing",
        "labels": {
            "id": "201",
            "system_name": "TEST1",
            "alertname": "NodeFailure",
            "severity": "critical",
            "VNFC": "vm001"
        },
        "annotations": {"service": "NodeSupervision", "description": "down"}
    }))
    .unwrap()
}

fn resolved_alert() -> Alert {
    serde_json::from_value(serde_json::json!({
        "status": "resolved",
        "labels": {
            "id": "201",
            "system_name": "TEST1",
            "alertname": "NodeFailure",
            "severity": "critical",
            "VNFC": "vm001"
        },
        "annotations": {
            "service": "NodeSupervision",
            "clearAlertName": "NodeEndOfFailure",
            "clearDescription": "up"
        }
    }))
    .unwrap()
}

/// Park both schedulers far in the future so only the tested stimulus
/// drives the loop.
fn park_schedulers(state: &StateStore) {
    let future = SystemTime::now() + Duration::from_secs(3600);
    state
        .update_scheduler("measurements", Duration::from_secs(300), future)
        .unwrap();
    state
        .update_scheduler("heartbeats", Duration::from_secs(60), future)
        .unwrap();
}

async fn send_alert(
    alert_tx: &mpsc::Sender<AlertMessage>,
    alert: Alert,
) -> Result<(), AgentError> {
    let (reply_tx, reply_rx) = oneshot::channel();
    alert_tx
        .send(AlertMessage {
            alert,
            reply: reply_tx,
        })
        .await
        .unwrap();
    reply_rx.await.unwrap()
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_heartbeat_posted_when_boundary_elapsed() {
    let collector: &'static MockCollector = Box::leak(Box::default());
    let state = StateStore::single_node();
    park_schedulers(&state);
    state
        .update_scheduler(
            "heartbeats",
            Duration::from_secs(5),
            SystemTime::now() - Duration::from_secs(1),
        )
        .unwrap();

    let (_alert_tx, alert_rx) = mpsc::channel(8);
    let mut agent = Agent::new(&test_config(), &collector, FakeSource, alert_rx, state.clone());
    let run = tokio::spawn(async move { agent.run(&collector).await });

    wait_until(|| !collector.posted().is_empty()).await;
    run.abort();

    let posted = collector.posted();
    let Event::Heartbeat(heartbeat) = &posted[0] else {
        panic!("expected a heartbeat event");
    };
    assert_eq!(heartbeat.header.event_id, "heartbeat0000000000");
    assert_eq!(heartbeat.header.event_name, "heartbeat_hsxp");
    assert_eq!(heartbeat.header.source_name, "hsxp5001");
    assert_eq!(heartbeat.heartbeat_fields.heartbeat_interval, 5);

    // Acknowledged: the boundary moved to the next interval multiple.
    let next = state.next_run("heartbeats").unwrap();
    assert!(next > SystemTime::now() - Duration::from_secs(5));
    assert_eq!(
        next,
        ves_common::time::truncate_to(next, Duration::from_secs(5))
    );
}

#[tokio::test]
async fn test_alert_posts_fault_and_commits_after_send() {
    let collector: &'static MockCollector = Box::leak(Box::default());
    let state = StateStore::single_node();
    park_schedulers(&state);

    let (alert_tx, alert_rx) = mpsc::channel(8);
    let mut agent = Agent::new(&test_config(), &collector, FakeSource, alert_rx, state.clone());
    let run = tokio::spawn(async move { agent.run(&collector).await });

    send_alert(&alert_tx, firing_alert()).await.unwrap();
    let posted = collector.posted();
    let Event::Fault(fault) = &posted[0] else {
        panic!("expected a fault event");
    };
    assert_eq!(fault.header.event_id, "fault0000000001");
    assert_eq!(fault.header.event_name, "Fault_hsxp_NodeFailure");
    assert_eq!(fault.header.sequence, 1);
    // Sequence bumped only after the successful post.
    assert_eq!(state.fault_sn(1), 2);

    // Resolving shares id and start epoch, then deletes the record.
    send_alert(&alert_tx, resolved_alert()).await.unwrap();
    let posted = collector.posted();
    let Event::Fault(resolved) = &posted[1] else {
        panic!("expected a fault event");
    };
    assert_eq!(resolved.header.event_id, "fault0000000001");
    assert_eq!(resolved.header.event_name, "Fault_hsxp_NodeEndOfFailure");
    assert_eq!(resolved.header.sequence, 2);
    assert_eq!(
        resolved.header.start_epoch_microsec,
        fault.header.start_epoch_microsec
    );
    assert_eq!(state.fault_id("201_NodeSupervision_vm001"), 0);

    run.abort();
}

#[tokio::test]
async fn test_failed_post_skips_commit_and_keeps_sequence() {
    let collector: &'static MockCollector = Box::leak(Box::default());
    collector.fail_posts.store(1, Ordering::SeqCst);
    let state = StateStore::single_node();
    park_schedulers(&state);

    let (alert_tx, alert_rx) = mpsc::channel(8);
    let mut agent = Agent::new(&test_config(), &collector, FakeSource, alert_rx, state.clone());
    let run = tokio::spawn(async move { agent.run(&collector).await });

    // First attempt fails at the collector: the error reaches the caller
    // and the sequence is not bumped.
    let err = send_alert(&alert_tx, firing_alert()).await.unwrap_err();
    assert!(matches!(err, AgentError::Post(_)));
    assert_eq!(state.fault_sn(1), 1);

    // The retry posts the same identity with the same sequence.
    send_alert(&alert_tx, firing_alert()).await.unwrap();
    let posted = collector.posted();
    let Event::Fault(fault) = &posted[0] else {
        panic!("expected a fault event");
    };
    assert_eq!(fault.header.event_id, "fault0000000001");
    assert_eq!(fault.header.sequence, 1);
    assert_eq!(state.fault_sn(1), 2);

    run.abort();
}

#[tokio::test]
async fn test_follower_rejects_alerts_without_touching_state() {
    let collector: &'static MockCollector = Box::leak(Box::default());
    let log = Arc::new(ControlledLog::new(false));
    let state = StateStore::new(log.clone());
    park_schedulers_on_leader(&log);

    let (alert_tx, alert_rx) = mpsc::channel(8);
    let mut agent = Agent::new(&test_config(), &collector, FakeSource, alert_rx, state.clone());
    let run = tokio::spawn(async move { agent.run(&collector).await });

    let err = send_alert(&alert_tx, firing_alert()).await.unwrap_err();
    assert!(matches!(err, AgentError::NotLeader));
    assert_eq!(state.fault_id("201_NodeSupervision_vm001"), 0);
    assert!(collector.posted().is_empty());

    // Once leadership arrives, the same alert goes through.
    log.leader_tx.send(true).unwrap();
    send_alert(&alert_tx, firing_alert()).await.unwrap();
    assert_eq!(collector.posted().len(), 1);

    run.abort();
}

/// Seed the schedulers through the inner log directly (the outer one
/// rejects writes while follower).
fn park_schedulers_on_leader(log: &ControlledLog) {
    let future = SystemTime::now() + Duration::from_secs(3600);
    for name in ["measurements", "heartbeats"] {
        log.inner
            .apply(StateCommand::UpdateScheduler {
                name: name.to_string(),
                interval_secs: Some(300),
                next_epoch_secs: Some(ves_common::time::epoch_secs(future)),
            })
            .unwrap();
    }
}

#[tokio::test]
async fn test_interval_change_reprograms_scheduler() {
    let collector: &'static MockCollector = Box::leak(Box::default());
    let state = StateStore::single_node();
    park_schedulers(&state);

    let (_alert_tx, alert_rx) = mpsc::channel(8);
    let mut agent = Agent::new(&test_config(), &collector, FakeSource, alert_rx, state.clone());

    // Agent::new subscribed one sink on each interval notification list.
    let hb_sub = collector.hb_subs.lock().unwrap()[0].clone();
    let run = tokio::spawn(async move { agent.run(&collector).await });

    hb_sub.send(Duration::from_secs(120)).await.unwrap();
    wait_until(|| state.interval("heartbeats") == Duration::from_secs(120)).await;

    // The boundary was recomputed on the new interval.
    let next = state.next_run("heartbeats").unwrap();
    assert_eq!(
        next,
        ves_common::time::round_to(next, Duration::from_secs(120))
    );

    run.abort();
}
