// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

use crate::event::{EventDomain, EventField, EventHeader, EventPriority};

/// Version of the `heartbeatFields` block.
pub const HEARTBEAT_FIELDS_VERSION: f32 = 1.0;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatFields {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_fields: Vec<EventField>,
    pub heartbeat_fields_version: f32,
    /// Current heartbeat emission interval, in seconds.
    pub heartbeat_interval: i64,
}

/// A heartbeat event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HeartbeatEvent {
    #[serde(rename = "commonEventHeader")]
    pub header: EventHeader,
    #[serde(rename = "heartbeatFields")]
    pub heartbeat_fields: HeartbeatFields,
}

impl HeartbeatEvent {
    /// New heartbeat event stamped with the current time.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        source_name: impl Into<String>,
        interval_secs: i64,
    ) -> Self {
        let mut header = EventHeader::new(
            EventDomain::Heartbeat,
            id,
            name,
            source_name,
            EventPriority::Normal,
        );
        header.start_epoch_microsec = ves_common::time::epoch_micros();
        header.last_epoch_microsec = header.start_epoch_microsec;
        HeartbeatEvent {
            header,
            heartbeat_fields: HeartbeatFields {
                additional_fields: Vec::new(),
                heartbeat_fields_version: HEARTBEAT_FIELDS_VERSION,
                heartbeat_interval: interval_secs,
            },
        }
    }
}
