// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Reconfiguration commands the collector may attach to any reply.

use serde::{Deserialize, Serialize};

use crate::event::EventDomain;

/// Kind of command sent by the server. Kept open: unrecognised kinds
/// decode into [`CommandType::Other`] so one unknown command cannot poison
/// a whole reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandType {
    #[serde(rename = "heartbeatIntervalChange")]
    HeartbeatIntervalChange,
    #[serde(rename = "measurementIntervalChange")]
    MeasurementIntervalChange,
    #[serde(rename = "provideThrottlingState")]
    ProvideThrottlingState,
    #[serde(rename = "throttlingSpecification")]
    ThrottlingSpecification,
    #[serde(untagged)]
    Other(String),
}

/// Specific name/value pair names to suppress within a named field, for
/// event throttling.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuppressedNvPairs {
    pub nv_pair_field_name: String,
    pub suppressed_nv_pair_names: Vec<String>,
}

/// Fields to suppress within an event domain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDomainThrottleSpecification {
    pub event_domain: EventDomain,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suppressed_field_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suppressed_nv_pairs_list: Vec<SuppressedNvPairs>,
}

/// A command sent by the server in a reply.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub command_type: CommandType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_domain_throttle_specification: Option<EventDomainThrottleSpecification>,
    /// Seconds; present when `command_type` is heartbeat-interval-change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval: Option<i64>,
    /// Seconds; present when `command_type` is measurement-interval-change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurement_interval: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_command_decodes() {
        let cmd: Command = serde_json::from_str(
            r#"{"commandType": "heartbeatIntervalChange", "heartbeatInterval": 120}"#,
        )
        .unwrap();
        assert_eq!(cmd.command_type, CommandType::HeartbeatIntervalChange);
        assert_eq!(cmd.heartbeat_interval, Some(120));
    }

    #[test]
    fn test_unknown_command_kind_is_open() {
        let cmd: Command =
            serde_json::from_str(r#"{"commandType": "somethingNew"}"#).unwrap();
        assert_eq!(cmd.command_type, CommandType::Other("somethingNew".to_string()));
    }
}
