// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! The VES agent: two replicated schedulers (measurements, heartbeats), a
//! fault correlation layer fed by an alert webhook, and the event loop
//! multiplexing them towards the collector cluster while honoring
//! leadership.

pub mod agent;
pub mod config;
pub mod convert;
pub mod heartbeat;
pub mod metrics;
pub mod rest;
pub mod scheduler;

/// Errors surfaced to webhook callers and the loop's own logging.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// This replica is not the leader; the caller may retry elsewhere.
    #[error("not the leader")]
    NotLeader,
    #[error("cannot convert alert to VES event")]
    Convert,
    #[error("cannot post event: {0}")]
    Post(#[from] ves_collector::ClientError),
    #[error(transparent)]
    State(#[from] ves_state::StateError),
}
