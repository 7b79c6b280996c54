// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Command;

/// Details of an error sent back by the event listener.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestError {
    pub message_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<String>,
}

impl fmt::Display for RequestError {
    /// `$1`, `$2`, … placeholders in `text` are substituted from
    /// `variables` before display.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut text = self.text.clone();
        for (i, var) in self.variables.iter().enumerate() {
            text = text.replace(&format!("${}", i + 1), var);
        }
        write!(f, "{}: {}", self.message_id, text)
    }
}

impl std::error::Error for RequestError {}

/// Optional reply from the event listener after an event has been posted.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VesResponse {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command_list: Vec<Command>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_error: Option<HashMap<String, RequestError>>,
}

impl VesResponse {
    pub fn is_error(&self) -> bool {
        self.request_error
            .as_ref()
            .is_some_and(|errors| !errors.is_empty())
    }

    /// The first error found in the reply envelope, if any.
    pub fn first_error(&self) -> Option<&RequestError> {
        self.request_error.as_ref()?.values().next()
    }
}
