// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! Client side of the VES event-listener protocol.
//!
//! [`VesClient`] speaks the raw HTTP/JSON exchange with one listener.
//! [`Collector`] wraps a client with the protocol niceties (topic path,
//! reporting-entity defaulting, server command processing).
//! [`CollectorCluster`] owns a primary and an optional backup collector and
//! moves the active pointer between them on repeated failures.

mod client;
mod cluster;
mod collector;

pub use client::VesClient;
pub use cluster::CollectorCluster;
pub use collector::{Collector, CollectorConfig, VesCollector};

use hyper::StatusCode;
use ves_event::{RequestError, SchemaError};

/// Failure classes of one post attempt.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Encoded request exceeds the configured maximum body size.
    #[error("request body length ({size}) exceeds the configured maximum ({max})")]
    BodyTooLarge { size: usize, max: usize },
    /// A single event exceeds the maximum body size; bisection cannot help.
    #[error("event is bigger than the maximum authorized body size")]
    EventTooLarge,
    /// Payload failed schema validation before sending.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// The listener answered an error status with a typed error envelope.
    #[error("event listener rejected the request: {0}")]
    Protocol(RequestError),
    /// Error status without a decodable error envelope.
    #[error("HTTP request failed (status {0})")]
    Http(StatusCode),
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(#[source] ves_common::hyper_migration::ClientError),
    #[error("cannot read response body: {0}")]
    Body(#[source] ves_common::hyper_migration::Error),
    #[error("cannot build request: {0}")]
    Build(anyhow::Error),
    #[error("cannot encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ClientError {
    /// Whether the cluster retry loop may try this request again.
    /// Deterministic failures (size, schema, typed protocol rejections)
    /// are not worth a retry or a collector switch.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Http(_)
                | ClientError::Timeout
                | ClientError::Network(_)
                | ClientError::Body(_)
        )
    }
}
