// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! JSON-Schema validation hook for outgoing payloads.
//!
//! The VES 28.4.1 schema document is injected (loaded from disk at
//! start-up); the event model itself never depends on its contents.

use serde::Serialize;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("cannot compile schema: {0}")]
    Compile(String),
    #[error("payload does not validate against schema: {0}")]
    Invalid(String),
    #[error("cannot encode payload for validation: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A compiled JSON-Schema document used to validate outgoing requests.
pub struct EventSchema {
    validator: jsonschema::Validator,
}

impl std::fmt::Debug for EventSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSchema").finish_non_exhaustive()
    }
}

impl EventSchema {
    pub fn from_value(document: serde_json::Value) -> Result<Self, SchemaError> {
        let validator = jsonschema::validator_for(&document)
            .map_err(|e| SchemaError::Compile(e.to_string()))?;
        Ok(EventSchema { validator })
    }

    pub fn from_json(document: &str) -> Result<Self, SchemaError> {
        Self::from_value(serde_json::from_str(document)?)
    }

    /// Validate `data` against the schema, collecting every violation into
    /// the error message.
    pub fn validate<T: Serialize>(&self, data: &T) -> Result<(), SchemaError> {
        let instance = serde_json::to_value(data)?;
        let violations: Vec<String> = self
            .validator
            .iter_errors(&instance)
            .map(|err| format!("{} at {}", err, err.instance_path))
            .collect();
        if violations.is_empty() {
            debug!("Payload validated against schema");
            Ok(())
        } else {
            Err(SchemaError::Invalid(violations.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn header_schema() -> EventSchema {
        EventSchema::from_value(json!({
            "type": "object",
            "required": ["event"],
            "properties": {
                "event": {
                    "type": "object",
                    "required": ["commonEventHeader"],
                    "properties": {
                        "commonEventHeader": {
                            "type": "object",
                            "required": ["domain", "eventId", "eventName", "priority",
                                         "reportingEntityName", "sequence", "sourceName",
                                         "startEpochMicrosec", "lastEpochMicrosec", "version"],
                            "properties": {
                                "priority": {"enum": ["High", "Medium", "Normal", "Low"]},
                                "sequence": {"type": "integer", "minimum": 0}
                            }
                        }
                    }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_valid_payload_passes() {
        let schema = header_schema();
        let payload = json!({"event": {"commonEventHeader": {
            "domain": "heartbeat", "eventId": "heartbeat0000000000",
            "eventName": "heartbeat_hsxp", "priority": "Normal",
            "reportingEntityName": "host", "sequence": 0,
            "sourceName": "hsxp5001", "startEpochMicrosec": 1, "lastEpochMicrosec": 1,
            "version": 3.0
        }}});
        schema.validate(&payload).unwrap();
    }

    #[test]
    fn test_invalid_payload_lists_violations() {
        let schema = header_schema();
        let payload = json!({"event": {"commonEventHeader": {"priority": "Urgent"}}});
        let err = schema.validate(&payload).unwrap_err();
        assert!(matches!(err, SchemaError::Invalid(_)));
        assert!(err.to_string().contains("priority"));
    }

    #[test]
    fn test_bad_schema_rejected() {
        let err = EventSchema::from_value(json!({"type": 12})).unwrap_err();
        assert!(matches!(err, SchemaError::Compile(_)));
    }
}
