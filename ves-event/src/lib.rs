// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! In-memory model of VES events (schema 28.4.1) and their wire shape.
//!
//! Every event is a common header plus one domain-specific field block,
//! serialised the way the event listener expects it:
//!
//! ```json
//! {"commonEventHeader": {...}, "heartbeatFields": {...}}
//! ```

mod batch;
mod commands;
mod config;
mod event;
mod fault;
mod heartbeat;
mod measurements;
mod response;
mod schema;

pub use batch::Batch;
pub use commands::{Command, CommandType, EventDomainThrottleSpecification, SuppressedNvPairs};
pub use config::{EventConfig, NfcNamingCode};
pub use event::{Event, EventDomain, EventField, EventHeader, EventPriority};
pub use fault::{EventFault, EventSourceType, FaultFields, Severity, VfStatus};
pub use heartbeat::{HeartbeatEvent, HeartbeatFields};
pub use measurements::{
    CodecsInUse, CpuUsage, DiskUsage, EventMeasurements, FeaturesInUse, FilesystemUsage,
    JsonObject, JsonObjectInstance, Key, LatencyBucketMeasure, MeasurementFields, MemoryUsage,
    NamedArrayOfFields, ValuesAreSuspect, VnicPerformance,
};
pub use response::{RequestError, VesResponse};
pub use schema::{EventSchema, SchemaError};
