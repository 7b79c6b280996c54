// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Serialisable copy of the whole agent state, as stored by the
//! replicated log's snapshot store.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::state::{AgentState, AlertInfo, SchedulerState};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    /// Interval in seconds.
    pub interval: u64,
    /// Next-run boundary as epoch seconds; absent when never initialised.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<i64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertInfoSnapshot {
    pub sn: i64,
    pub epoch: i64,
}

/// A single JSON object carrying every replicated field.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub meas_idx: i64,
    pub hb_idx: i64,
    pub schedulers: HashMap<String, SchedulerSnapshot>,
    pub fault_idx: i32,
    pub alert_infos: HashMap<i32, AlertInfoSnapshot>,
    pub fault_store: HashMap<String, i32>,
}

impl AgentSnapshot {
    pub fn capture(state: &AgentState) -> Self {
        let (meas_idx, hb_idx, fault_idx) = state.counters();
        let (fault_store, alert_infos) = state.faults();
        AgentSnapshot {
            meas_idx,
            hb_idx,
            fault_idx,
            schedulers: state
                .schedulers()
                .iter()
                .map(|(name, sched)| {
                    (
                        name.clone(),
                        SchedulerSnapshot {
                            interval: sched.interval.as_secs(),
                            next: sched.next.map(ves_common::time::epoch_secs),
                        },
                    )
                })
                .collect(),
            alert_infos: alert_infos
                .iter()
                .map(|(id, info)| {
                    (
                        *id,
                        AlertInfoSnapshot {
                            sn: info.sequence,
                            epoch: info.start_epoch,
                        },
                    )
                })
                .collect(),
            fault_store: fault_store.clone(),
        }
    }

    /// Overwrite `state` with this snapshot's contents.
    pub fn restore_into(&self, state: &mut AgentState) {
        state.set_counters(self.meas_idx, self.hb_idx, self.fault_idx);
        state.set_schedulers(
            self.schedulers
                .iter()
                .map(|(name, sched)| {
                    (
                        name.clone(),
                        SchedulerState {
                            interval: Duration::from_secs(sched.interval),
                            next: sched.next.map(ves_common::time::from_epoch_secs),
                        },
                    )
                })
                .collect(),
        );
        state.set_faults(
            self.fault_store.clone(),
            self.alert_infos
                .iter()
                .map(|(id, info)| {
                    (
                        *id,
                        AlertInfo {
                            sequence: info.sn,
                            start_epoch: info.epoch,
                        },
                    )
                })
                .collect(),
        );
    }
}
