// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use serde::{Deserialize, Serialize};

/// A state change command sent through the commit log.
///
/// Commands are what replicas agree on, so the serialised shape is part of
/// the replication contract and every field is explicit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateCommand {
    /// Allocate the next measurement event index.
    IncrementMeasIdx,
    /// Allocate the next heartbeat event index.
    IncrementHeartbeatIdx,
    /// Allocate the next fault id.
    IncrementFaultIdx,
    /// Update interval and/or next-run boundary of a named scheduler.
    UpdateScheduler {
        name: String,
        /// New interval in seconds, when updated.
        #[serde(skip_serializing_if = "Option::is_none")]
        interval_secs: Option<u64>,
        /// New next-run boundary as epoch seconds, when updated.
        #[serde(skip_serializing_if = "Option::is_none")]
        next_epoch_secs: Option<i64>,
    },
    /// Update a fault record. `fault_name` creates the identity mapping and
    /// initialises its sequence/start-epoch record; a present
    /// `sequence_number` is an instruction to *increment* the stored
    /// sequence, whatever value it carries; `start_epoch` assigns.
    UpdateFault {
        fault_id: i32,
        #[serde(skip_serializing_if = "Option::is_none")]
        fault_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sequence_number: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        start_epoch: Option<i64>,
    },
    /// Remove a fault identity and its sequence/start-epoch record.
    DeleteFault { fault_name: String },
}

impl fmt::Display for StateCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateCommand::IncrementMeasIdx => write!(f, "IncrementMeasIdx"),
            StateCommand::IncrementHeartbeatIdx => write!(f, "IncrementHeartbeatIdx"),
            StateCommand::IncrementFaultIdx => write!(f, "IncrementFaultIdx"),
            StateCommand::UpdateScheduler {
                name,
                interval_secs,
                next_epoch_secs,
            } => write!(
                f,
                "UpdateScheduler name: {name}, interval: {interval_secs:?}, next: {next_epoch_secs:?}"
            ),
            StateCommand::UpdateFault {
                fault_id,
                fault_name,
                sequence_number,
                start_epoch,
            } => write!(
                f,
                "UpdateFault id: {fault_id}, name: {fault_name:?}, sn: {sequence_number:?}, epoch: {start_epoch:?}"
            ),
            StateCommand::DeleteFault { fault_name } => {
                write!(f, "DeleteFault name: {fault_name}")
            }
        }
    }
}

/// What a committed command returns to its caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandOutput {
    None,
    /// Allocated event index (measurement or heartbeat counters).
    Index(i64),
    /// Allocated fault id.
    FaultIndex(i32),
}
