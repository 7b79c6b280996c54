// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use tracing::debug;

use crate::command::{CommandOutput, StateCommand};
use crate::StateError;

/// Durable timing of one scheduler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerState {
    pub interval: Duration,
    /// Next-run boundary; `None` until first initialised.
    pub next: Option<SystemTime>,
}

/// Per-fault monotone sequence and frozen start time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AlertInfo {
    pub sequence: i64,
    pub start_epoch: i64,
}

/// The agent's replicated state. Mutated exclusively through
/// [`AgentState::apply`], which is a pure function of (state, command) so
/// replays on every replica converge.
#[derive(Debug, Default)]
pub struct AgentState {
    meas_idx: i64,
    hb_idx: i64,
    schedulers: HashMap<String, SchedulerState>,
    fault_idx: i32,
    fault_store: HashMap<String, i32>,
    alert_infos: HashMap<i32, AlertInfo>,
}

impl AgentState {
    pub fn new() -> Self {
        AgentState::default()
    }

    /// Apply one committed command, returning its output.
    pub fn apply(&mut self, cmd: &StateCommand) -> Result<CommandOutput, StateError> {
        match cmd {
            StateCommand::IncrementMeasIdx => {
                let idx = self.meas_idx;
                self.meas_idx += 1;
                Ok(CommandOutput::Index(idx))
            }
            StateCommand::IncrementHeartbeatIdx => {
                let idx = self.hb_idx;
                self.hb_idx += 1;
                Ok(CommandOutput::Index(idx))
            }
            StateCommand::IncrementFaultIdx => {
                self.fault_idx += 1;
                debug!(fault_idx = self.fault_idx, "Allocated fault index");
                Ok(CommandOutput::FaultIndex(self.fault_idx))
            }
            StateCommand::UpdateScheduler {
                name,
                interval_secs,
                next_epoch_secs,
            } => {
                let sched = self.schedulers.entry(name.clone()).or_default();
                if let Some(secs) = interval_secs {
                    sched.interval = Duration::from_secs(*secs);
                }
                if let Some(epoch) = next_epoch_secs {
                    sched.next = Some(ves_common::time::from_epoch_secs(*epoch));
                }
                Ok(CommandOutput::None)
            }
            StateCommand::UpdateFault {
                fault_id,
                fault_name,
                sequence_number,
                start_epoch,
            } => {
                if let Some(name) = fault_name {
                    debug!(fault = %name, id = fault_id, "Storing fault identity");
                    self.fault_store.insert(name.clone(), *fault_id);
                    self.alert_infos.insert(
                        *fault_id,
                        AlertInfo {
                            sequence: 1,
                            start_epoch: 0,
                        },
                    );
                }
                if sequence_number.is_some() {
                    // The request value is an instruction to increment, not
                    // an assignment.
                    let info = self
                        .alert_infos
                        .get_mut(fault_id)
                        .ok_or(StateError::UnknownFault(*fault_id))?;
                    info.sequence += 1;
                }
                if let Some(epoch) = start_epoch {
                    let info = self.alert_infos.entry(*fault_id).or_insert(AlertInfo {
                        sequence: 1,
                        start_epoch: 0,
                    });
                    info.start_epoch = *epoch;
                }
                Ok(CommandOutput::None)
            }
            StateCommand::DeleteFault { fault_name } => {
                debug!(fault = %fault_name, "Deleting fault identity");
                if let Some(id) = self.fault_store.remove(fault_name) {
                    self.alert_infos.remove(&id);
                }
                Ok(CommandOutput::None)
            }
        }
    }

    /// Next-run boundary of the named scheduler, when initialised.
    pub fn next_run(&self, sched: &str) -> Option<SystemTime> {
        self.schedulers.get(sched).and_then(|s| s.next)
    }

    /// Configured interval of the named scheduler; zero when unset.
    pub fn interval(&self, sched: &str) -> Duration {
        self.schedulers
            .get(sched)
            .map(|s| s.interval)
            .unwrap_or_default()
    }

    /// Fault id bound to `fault_name`, or 0 when absent.
    pub fn fault_id(&self, fault_name: &str) -> i32 {
        self.fault_store.get(fault_name).copied().unwrap_or(0)
    }

    /// Sequence number of `fault_id`, or 0 when unknown.
    pub fn fault_sn(&self, fault_id: i32) -> i64 {
        self.alert_infos
            .get(&fault_id)
            .map(|info| info.sequence)
            .unwrap_or(0)
    }

    /// Frozen start epoch of `fault_id`, or 0 when unknown.
    pub fn fault_start_epoch(&self, fault_id: i32) -> i64 {
        self.alert_infos
            .get(&fault_id)
            .map(|info| info.start_epoch)
            .unwrap_or(0)
    }

    pub(crate) fn counters(&self) -> (i64, i64, i32) {
        (self.meas_idx, self.hb_idx, self.fault_idx)
    }

    pub(crate) fn set_counters(&mut self, meas_idx: i64, hb_idx: i64, fault_idx: i32) {
        self.meas_idx = meas_idx;
        self.hb_idx = hb_idx;
        self.fault_idx = fault_idx;
    }

    pub(crate) fn schedulers(&self) -> &HashMap<String, SchedulerState> {
        &self.schedulers
    }

    pub(crate) fn set_schedulers(&mut self, schedulers: HashMap<String, SchedulerState>) {
        self.schedulers = schedulers;
    }

    pub(crate) fn faults(&self) -> (&HashMap<String, i32>, &HashMap<i32, AlertInfo>) {
        (&self.fault_store, &self.alert_infos)
    }

    pub(crate) fn set_faults(
        &mut self,
        fault_store: HashMap<String, i32>,
        alert_infos: HashMap<i32, AlertInfo>,
    ) {
        self.fault_store = fault_store;
        self.alert_infos = alert_infos;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    #[test]
    fn test_event_counters_start_at_zero() {
        let mut state = AgentState::new();
        assert_eq!(
            state.apply(&StateCommand::IncrementMeasIdx).unwrap(),
            CommandOutput::Index(0)
        );
        assert_eq!(
            state.apply(&StateCommand::IncrementMeasIdx).unwrap(),
            CommandOutput::Index(1)
        );
        assert_eq!(
            state.apply(&StateCommand::IncrementHeartbeatIdx).unwrap(),
            CommandOutput::Index(0)
        );
    }

    #[test]
    fn test_fault_counter_starts_at_one() {
        let mut state = AgentState::new();
        assert_eq!(
            state.apply(&StateCommand::IncrementFaultIdx).unwrap(),
            CommandOutput::FaultIndex(1)
        );
        assert_eq!(
            state.apply(&StateCommand::IncrementFaultIdx).unwrap(),
            CommandOutput::FaultIndex(2)
        );
    }

    #[test]
    fn test_update_fault_with_name_initialises_alert_info() {
        let mut state = AgentState::new();
        state
            .apply(&StateCommand::UpdateFault {
                fault_id: 1,
                fault_name: Some("fault_a".to_string()),
                sequence_number: None,
                start_epoch: None,
            })
            .unwrap();
        assert_eq!(state.fault_id("fault_a"), 1);
        assert_eq!(state.fault_sn(1), 1);
        assert_eq!(state.fault_start_epoch(1), 0);
    }

    #[test]
    fn test_sequence_number_is_an_increment_instruction() {
        let mut state = AgentState::new();
        state
            .apply(&StateCommand::UpdateFault {
                fault_id: 1,
                fault_name: Some("fault_a".to_string()),
                sequence_number: None,
                start_epoch: None,
            })
            .unwrap();
        // Whatever value the command carries, the stored sequence bumps by 1.
        for expected in [2, 3, 4] {
            state
                .apply(&StateCommand::UpdateFault {
                    fault_id: 1,
                    fault_name: None,
                    sequence_number: Some(999),
                    start_epoch: None,
                })
                .unwrap();
            assert_eq!(state.fault_sn(1), expected);
        }
    }

    #[test]
    fn test_sequence_bump_of_unknown_fault_fails() {
        let mut state = AgentState::new();
        let err = state
            .apply(&StateCommand::UpdateFault {
                fault_id: 7,
                fault_name: None,
                sequence_number: Some(1),
                start_epoch: None,
            })
            .unwrap_err();
        assert!(matches!(err, StateError::UnknownFault(7)));
    }

    #[test]
    fn test_delete_fault_removes_both_records() {
        let mut state = AgentState::new();
        state
            .apply(&StateCommand::UpdateFault {
                fault_id: 1,
                fault_name: Some("fault_a".to_string()),
                sequence_number: None,
                start_epoch: Some(123),
            })
            .unwrap();
        state
            .apply(&StateCommand::DeleteFault {
                fault_name: "fault_a".to_string(),
            })
            .unwrap();
        assert_eq!(state.fault_id("fault_a"), 0);
        assert_eq!(state.fault_sn(1), 0);
        assert_eq!(state.fault_start_epoch(1), 0);
    }

    #[test]
    fn test_scheduler_update_partial_fields() {
        let mut state = AgentState::new();
        state
            .apply(&StateCommand::UpdateScheduler {
                name: "measurements".to_string(),
                interval_secs: Some(300),
                next_epoch_secs: None,
            })
            .unwrap();
        assert_eq!(state.interval("measurements"), Duration::from_secs(300));
        assert_eq!(state.next_run("measurements"), None);

        state
            .apply(&StateCommand::UpdateScheduler {
                name: "measurements".to_string(),
                interval_secs: None,
                next_epoch_secs: Some(1_000_000),
            })
            .unwrap();
        assert_eq!(state.interval("measurements"), Duration::from_secs(300));
        assert_eq!(
            state.next_run("measurements"),
            Some(UNIX_EPOCH + Duration::from_secs(1_000_000))
        );
    }
}
