// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use ves_event::{EventConfig, HeartbeatEvent};
use ves_state::StateStore;

use crate::scheduler::Job;

/// Job producing one heartbeat event per tick with a monotone index.
pub struct HeartbeatMonitor {
    source_name: String,
    nf_naming_code: String,
    naming_codes: HashMap<String, String>,
    state: StateStore,
}

impl HeartbeatMonitor {
    pub fn new(
        event: &EventConfig,
        naming_codes: HashMap<String, String>,
        state: StateStore,
    ) -> Self {
        HeartbeatMonitor {
            source_name: event.vnf_name.clone(),
            nf_naming_code: event.nf_naming_code.clone(),
            naming_codes,
            state,
        }
    }
}

impl Job for HeartbeatMonitor {
    type Output = HeartbeatEvent;

    async fn run(
        &mut self,
        _from: SystemTime,
        _to: SystemTime,
        interval: Duration,
    ) -> anyhow::Result<HeartbeatEvent> {
        let idx = self.state.next_heartbeat_index()?;
        let id = format!("heartbeat{idx:010}");
        let name = format!("heartbeat_{}", self.nf_naming_code);
        let mut heartbeat =
            HeartbeatEvent::new(id, name, &*self.source_name, interval.as_secs() as i64);
        heartbeat.header.nf_naming_code = self.nf_naming_code.clone();
        heartbeat.header.nfc_naming_code = self
            .naming_codes
            .get(&self.source_name)
            .cloned()
            .unwrap_or_default();
        Ok(heartbeat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> HeartbeatMonitor {
        let event = EventConfig {
            vnf_name: "hsxp5001".to_string(),
            nf_naming_code: "hsxp".to_string(),
            ..Default::default()
        };
        let codes = HashMap::from([("hsxp5001".to_string(), "oam".to_string())]);
        HeartbeatMonitor::new(&event, codes, StateStore::single_node())
    }

    #[tokio::test]
    async fn test_heartbeat_ids_are_monotone_and_zero_padded() {
        let mut monitor = monitor();
        let now = SystemTime::now();
        let hb = monitor
            .run(now, now, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(hb.header.event_id, "heartbeat0000000000");
        assert_eq!(hb.header.event_name, "heartbeat_hsxp");
        assert_eq!(hb.header.source_name, "hsxp5001");
        assert_eq!(hb.header.nf_naming_code, "hsxp");
        assert_eq!(hb.header.nfc_naming_code, "oam");
        assert_eq!(hb.heartbeat_fields.heartbeat_interval, 5);

        let hb = monitor
            .run(now, now, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(hb.header.event_id, "heartbeat0000000001");
    }
}
