// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

use crate::event::{EventDomain, EventField, EventHeader, EventPriority};

/// Version of the `faultFields` block.
pub const FAULT_FIELDS_VERSION: f32 = 2.0;

/// Fault severity, as reported to the collector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    Major,
    Minor,
    Warning,
    Normal,
}

impl Severity {
    /// Parse a severity name case-insensitively. Unknown names are `None`.
    pub fn parse(s: &str) -> Option<Severity> {
        match s.to_ascii_uppercase().as_str() {
            "CRITICAL" => Some(Severity::Critical),
            "MAJOR" => Some(Severity::Major),
            "MINOR" => Some(Severity::Minor),
            "WARNING" => Some(Severity::Warning),
            "NORMAL" => Some(Severity::Normal),
            _ => None,
        }
    }
}

/// Virtual function status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VfStatus {
    Active,
    Idle,
    #[serde(rename = "Preparing to terminate")]
    PrepTerminate,
    #[serde(rename = "Ready to terminate")]
    ReadyTerminate,
    #[serde(rename = "Requesting termination")]
    RequestTerminate,
}

/// Kind of entity the fault originates from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventSourceType {
    Other,
    Router,
    Switch,
    Host,
    Card,
    Port,
    SlotThreshold,
    PortThreshold,
    VirtualMachine,
    VirtualNetworkFunction,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaultFields {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alarm_additional_information: Vec<EventField>,
    pub alarm_condition: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub alarm_interface_a: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub event_category: String,
    pub event_severity: Severity,
    pub event_source_type: EventSourceType,
    pub fault_fields_version: f32,
    pub specific_problem: String,
    pub vf_status: VfStatus,
}

/// A fault event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventFault {
    #[serde(rename = "commonEventHeader")]
    pub header: EventHeader,
    #[serde(rename = "faultFields")]
    pub fault_fields: FaultFields,
}

impl EventFault {
    /// New fault event stamped with the current time.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        id: impl Into<String>,
        condition: impl Into<String>,
        specific_problem: impl Into<String>,
        priority: EventPriority,
        severity: Severity,
        source_type: EventSourceType,
        status: VfStatus,
        source_name: impl Into<String>,
    ) -> Self {
        let mut header = EventHeader::new(EventDomain::Fault, id, name, source_name, priority);
        header.start_epoch_microsec = ves_common::time::epoch_micros();
        header.last_epoch_microsec = header.start_epoch_microsec;
        EventFault {
            header,
            fault_fields: FaultFields {
                alarm_additional_information: Vec::new(),
                alarm_condition: condition.into(),
                alarm_interface_a: String::new(),
                event_category: String::new(),
                event_severity: severity,
                event_source_type: source_type,
                fault_fields_version: FAULT_FIELDS_VERSION,
                specific_problem: specific_problem.into(),
                vf_status: status,
            },
        }
    }
}
