// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

use crate::{EventFault, EventMeasurements, HeartbeatEvent};

/// Version of the `commonEventHeader` block.
pub const EVENT_HEADER_VERSION: f32 = 3.0;

/// The kind of event, as named by the `domain` header field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventDomain {
    Fault,
    Heartbeat,
    MeasurementsForVfScaling,
    MobileFlow,
    Other,
    SipSignaling,
    StateChange,
    Syslog,
    ThresholdCrossingAlert,
    VoiceQuality,
}

/// Event's level of priority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventPriority {
    High,
    Medium,
    Normal,
    Low,
}

/// Common part of all kinds of events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventHeader {
    pub domain: EventDomain,
    pub event_id: String,
    pub event_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub event_type: String,
    pub last_epoch_microsec: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub nf_naming_code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub nfc_naming_code: String,
    pub priority: EventPriority,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reporting_entity_id: String,
    #[serde(default)]
    pub reporting_entity_name: String,
    pub sequence: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_id: String,
    pub source_name: String,
    pub start_epoch_microsec: i64,
    pub version: f32,
}

impl EventHeader {
    /// Header skeleton with timing, sequence and naming fields zeroed.
    pub(crate) fn new(
        domain: EventDomain,
        id: impl Into<String>,
        name: impl Into<String>,
        source_name: impl Into<String>,
        priority: EventPriority,
    ) -> Self {
        EventHeader {
            domain,
            event_id: id.into(),
            event_name: name.into(),
            event_type: String::new(),
            last_epoch_microsec: 0,
            nf_naming_code: String::new(),
            nfc_naming_code: String::new(),
            priority,
            reporting_entity_id: String::new(),
            reporting_entity_name: String::new(),
            sequence: 0,
            source_id: String::new(),
            source_name: source_name.into(),
            start_epoch_microsec: 0,
            version: EVENT_HEADER_VERSION,
        }
    }
}

/// Name/value pair used by the additional-information blocks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventField {
    pub name: String,
    pub value: String,
}

/// Any event the agent can emit. The variant is identified on the wire by
/// its domain-specific field block, so serialisation is untagged.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Event {
    Fault(EventFault),
    Heartbeat(HeartbeatEvent),
    Measurements(Box<EventMeasurements>),
}

impl Event {
    pub fn header(&self) -> &EventHeader {
        match self {
            Event::Fault(evt) => &evt.header,
            Event::Heartbeat(evt) => &evt.header,
            Event::Measurements(evt) => &evt.header,
        }
    }

    pub fn header_mut(&mut self) -> &mut EventHeader {
        match self {
            Event::Fault(evt) => &mut evt.header,
            Event::Heartbeat(evt) => &mut evt.header,
            Event::Measurements(evt) => &mut evt.header,
        }
    }
}

impl From<EventFault> for Event {
    fn from(evt: EventFault) -> Self {
        Event::Fault(evt)
    }
}

impl From<HeartbeatEvent> for Event {
    fn from(evt: HeartbeatEvent) -> Self {
        Event::Heartbeat(evt)
    }
}

impl From<EventMeasurements> for Event {
    fn from(evt: EventMeasurements) -> Self {
        Event::Measurements(Box::new(evt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_wire_names() {
        let hb = HeartbeatEvent::new("heartbeat0000000000", "heartbeat_hsxp", "hsxp5001", 5);
        let json = serde_json::to_value(Event::from(hb)).unwrap();
        let header = &json["commonEventHeader"];
        assert_eq!(header["domain"], "heartbeat");
        assert_eq!(header["eventId"], "heartbeat0000000000");
        assert_eq!(header["priority"], "Normal");
        assert_eq!(header["sourceName"], "hsxp5001");
        // empty optional names are omitted
        assert!(header.get("nfNamingCode").is_none());
        assert_eq!(json["heartbeatFields"]["heartbeatInterval"], 5);
    }

    #[test]
    fn test_untagged_round_trip() {
        let hb = Event::from(HeartbeatEvent::new("heartbeat0000000001", "heartbeat_hsxp", "vnf", 60));
        let json = serde_json::to_string(&hb).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, Event::Heartbeat(_)));
        assert_eq!(back.header().event_id, "heartbeat0000000001");
    }
}
