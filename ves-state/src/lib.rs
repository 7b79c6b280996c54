// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! Replicated agent state.
//!
//! Every mutation of the agent's counters, scheduler timings and fault
//! bookkeeping is a [`StateCommand`] applied through a [`ReplicatedLog`].
//! A log implementation decides how commands reach the other replicas; the
//! in-tree [`SingleNodeLog`] commits locally and is always leader, which is
//! the fallback when no cluster is configured. Reads never touch the log:
//! they see the last applied state on the local node.

mod command;
mod log;
mod snapshot;
mod state;

pub use command::{CommandOutput, StateCommand};
pub use log::{ReplicatedLog, SingleNodeLog, StateStore};
pub use snapshot::{AgentSnapshot, AlertInfoSnapshot, SchedulerSnapshot};
pub use state::{AgentState, AlertInfo, SchedulerState};

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// The command was rejected because this node is not the leader.
    #[error("not the cluster leader")]
    NotLeader,
    /// The command could not be committed across the cluster.
    #[error("cannot commit state command: {0}")]
    CommitFailed(String),
    /// The command referenced a fault record that does not exist.
    #[error("fault {0} does not exist")]
    UnknownFault(i32),
    /// The log returned something other than what the command expects.
    #[error("unexpected command output")]
    UnexpectedOutput,
}
