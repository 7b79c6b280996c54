// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info};

use ves_common::MutexExt;

use crate::command::{CommandOutput, StateCommand};
use crate::snapshot::AgentSnapshot;
use crate::state::AgentState;
use crate::StateError;

/// The consensus seam.
///
/// `apply` blocks until the command is committed across a quorum and
/// applied locally; it fails with [`StateError::NotLeader`] on any node
/// that is not the current leader. Reads are served from the local
/// last-applied state and never touch the log.
pub trait ReplicatedLog: Send + Sync {
    fn apply(&self, cmd: StateCommand) -> Result<CommandOutput, StateError>;

    fn snapshot(&self) -> AgentSnapshot;
    fn restore(&self, snapshot: &AgentSnapshot);

    /// Stream of leadership changes for this node. The receiver reflects
    /// the latest known state immediately.
    fn leader_watch(&self) -> watch::Receiver<bool>;
    fn is_leader(&self) -> bool;

    /// Debug counters for the stats endpoint. Not a stable interface.
    fn stats(&self) -> serde_json::Value;

    fn next_run(&self, sched: &str) -> Option<SystemTime>;
    fn interval(&self, sched: &str) -> Duration;
    fn fault_id(&self, fault_name: &str) -> i32;
    fn fault_sn(&self, fault_id: i32) -> i64;
    fn fault_start_epoch(&self, fault_id: i32) -> i64;
}

/// In-process fallback log used when no cluster is configured: commands
/// commit locally and the node is always leader.
pub struct SingleNodeLog {
    state: Mutex<AgentState>,
    applied: AtomicU64,
    leader_tx: watch::Sender<bool>,
}

impl SingleNodeLog {
    pub fn new() -> Self {
        info!("No cluster configuration, replicating state in-process only");
        let (leader_tx, _) = watch::channel(true);
        SingleNodeLog {
            state: Mutex::new(AgentState::new()),
            applied: AtomicU64::new(0),
            leader_tx,
        }
    }
}

impl Default for SingleNodeLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplicatedLog for SingleNodeLog {
    fn apply(&self, cmd: StateCommand) -> Result<CommandOutput, StateError> {
        debug!(command = %cmd, "Applying state command");
        let out = self.state.lock_or_panic().apply(&cmd)?;
        self.applied.fetch_add(1, Ordering::Relaxed);
        Ok(out)
    }

    fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot::capture(&self.state.lock_or_panic())
    }

    fn restore(&self, snapshot: &AgentSnapshot) {
        snapshot.restore_into(&mut self.state.lock_or_panic());
    }

    fn leader_watch(&self) -> watch::Receiver<bool> {
        self.leader_tx.subscribe()
    }

    fn is_leader(&self) -> bool {
        true
    }

    fn stats(&self) -> serde_json::Value {
        json!({
            "mode": "single-node",
            "leader": true,
            "applied": self.applied.load(Ordering::Relaxed),
        })
    }

    fn next_run(&self, sched: &str) -> Option<SystemTime> {
        self.state.lock_or_panic().next_run(sched)
    }

    fn interval(&self, sched: &str) -> Duration {
        self.state.lock_or_panic().interval(sched)
    }

    fn fault_id(&self, fault_name: &str) -> i32 {
        self.state.lock_or_panic().fault_id(fault_name)
    }

    fn fault_sn(&self, fault_id: i32) -> i64 {
        self.state.lock_or_panic().fault_sn(fault_id)
    }

    fn fault_start_epoch(&self, fault_id: i32) -> i64 {
        self.state.lock_or_panic().fault_start_epoch(fault_id)
    }
}

/// Shared handle over a [`ReplicatedLog`] with the typed mutation helpers
/// the schedulers, monitors and the fault manager use.
#[derive(Clone)]
pub struct StateStore {
    log: Arc<dyn ReplicatedLog>,
}

impl StateStore {
    pub fn new(log: Arc<dyn ReplicatedLog>) -> Self {
        StateStore { log }
    }

    pub fn single_node() -> Self {
        Self::new(Arc::new(SingleNodeLog::new()))
    }

    pub fn log(&self) -> &Arc<dyn ReplicatedLog> {
        &self.log
    }

    /// Allocate the next measurement event index.
    pub fn next_measurement_index(&self) -> Result<i64, StateError> {
        match self.log.apply(StateCommand::IncrementMeasIdx)? {
            CommandOutput::Index(idx) => Ok(idx),
            _ => Err(StateError::UnexpectedOutput),
        }
    }

    /// Allocate the next heartbeat event index.
    pub fn next_heartbeat_index(&self) -> Result<i64, StateError> {
        match self.log.apply(StateCommand::IncrementHeartbeatIdx)? {
            CommandOutput::Index(idx) => Ok(idx),
            _ => Err(StateError::UnexpectedOutput),
        }
    }

    /// Allocate the next fault id.
    pub fn next_fault_index(&self) -> Result<i32, StateError> {
        match self.log.apply(StateCommand::IncrementFaultIdx)? {
            CommandOutput::FaultIndex(idx) => Ok(idx),
            _ => Err(StateError::UnexpectedOutput),
        }
    }

    pub fn next_run(&self, sched: &str) -> Option<SystemTime> {
        self.log.next_run(sched)
    }

    pub fn update_next_run(&self, sched: &str, next: SystemTime) -> Result<(), StateError> {
        self.log.apply(StateCommand::UpdateScheduler {
            name: sched.to_string(),
            interval_secs: None,
            next_epoch_secs: Some(ves_common::time::epoch_secs(next)),
        })?;
        Ok(())
    }

    pub fn interval(&self, sched: &str) -> Duration {
        self.log.interval(sched)
    }

    /// Set interval and next-run boundary atomically (one command).
    pub fn update_scheduler(
        &self,
        sched: &str,
        interval: Duration,
        next: SystemTime,
    ) -> Result<(), StateError> {
        self.log.apply(StateCommand::UpdateScheduler {
            name: sched.to_string(),
            interval_secs: Some(interval.as_secs()),
            next_epoch_secs: Some(ves_common::time::epoch_secs(next)),
        })?;
        Ok(())
    }

    /// Bind `fault_name` to `fault_id` and initialise its alert record.
    pub fn store_fault(&self, fault_name: &str, fault_id: i32) -> Result<(), StateError> {
        self.log.apply(StateCommand::UpdateFault {
            fault_id,
            fault_name: Some(fault_name.to_string()),
            sequence_number: None,
            start_epoch: None,
        })?;
        Ok(())
    }

    pub fn fault_id(&self, fault_name: &str) -> i32 {
        self.log.fault_id(fault_name)
    }

    pub fn fault_sn(&self, fault_id: i32) -> i64 {
        self.log.fault_sn(fault_id)
    }

    pub fn increment_fault_sn(&self, fault_id: i32) -> Result<(), StateError> {
        self.log.apply(StateCommand::UpdateFault {
            fault_id,
            fault_name: None,
            // Sentinel: any present value means "increment".
            sequence_number: Some(1),
            start_epoch: None,
        })?;
        Ok(())
    }

    pub fn fault_start_epoch(&self, fault_id: i32) -> i64 {
        self.log.fault_start_epoch(fault_id)
    }

    pub fn set_fault_start_epoch(&self, fault_id: i32, epoch: i64) -> Result<(), StateError> {
        self.log.apply(StateCommand::UpdateFault {
            fault_id,
            fault_name: None,
            sequence_number: None,
            start_epoch: Some(epoch),
        })?;
        Ok(())
    }

    pub fn delete_fault(&self, fault_name: &str) -> Result<(), StateError> {
        self.log.apply(StateCommand::DeleteFault {
            fault_name: fault_name.to_string(),
        })?;
        Ok(())
    }

    pub fn leader_watch(&self) -> watch::Receiver<bool> {
        self.log.leader_watch()
    }

    pub fn is_leader(&self) -> bool {
        self.log.is_leader()
    }

    pub fn stats(&self) -> serde_json::Value {
        self.log.stats()
    }
}
