// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Mapping between one nfc naming code (e.g. `oam`, `etl`) and the VNFCs
/// it applies to.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NfcNamingCode {
    #[serde(rename = "type")]
    pub kind: String,
    pub vnfcs: Vec<String>,
}

/// Event composition parameters shared by everything that builds events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventConfig {
    /// Name of this VNF, e.g. `dpa2bhsxp5001v`.
    pub vnf_name: String,
    /// Value of the reporting entity field. Usually the local VM name.
    pub reporting_entity_name: String,
    /// Reporting entity UUID. Usually the local VM UUID.
    pub reporting_entity_id: String,
    /// Maximum encoded request size in bytes; 0 disables the limit.
    pub max_size: usize,
    pub nf_naming_code: String,
    pub nfc_naming_codes: Vec<NfcNamingCode>,
    /// Seconds to wait between failed posts before retrying.
    pub retry_interval_secs: u64,
    /// Consecutive misses before switching collector.
    pub max_missed: u32,
}

impl Default for EventConfig {
    fn default() -> Self {
        EventConfig {
            vnf_name: String::new(),
            reporting_entity_name: String::new(),
            reporting_entity_id: String::new(),
            max_size: 2_000_000,
            nf_naming_code: String::new(),
            nfc_naming_codes: Vec::new(),
            retry_interval_secs: 5,
            max_missed: 2,
        }
    }
}

impl EventConfig {
    /// Flatten the configured naming codes into a vnfc-name → code table.
    pub fn naming_codes(&self) -> HashMap<String, String> {
        let mut codes = HashMap::new();
        for naming_code in &self.nfc_naming_codes {
            for vnfc in &naming_code.vnfcs {
                codes.insert(vnfc.clone(), naming_code.kind.clone());
            }
        }
        codes
    }
}
