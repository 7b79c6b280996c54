// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Alert → VES fault translation.
//!
//! Firing/resolved alert pairs correlate through a canonical fault name;
//! the fault manager binds each name to a stable fault id with a monotone
//! sequence and a start epoch frozen at the first successful post. State
//! changes that must only happen after the event reached the collector
//! (sequence bump, record deletion) are returned as a commit closure.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Deserialize;
use tracing::{debug, info, warn};

use ves_common::MutexExt;
use ves_event::{
    EventConfig, EventField, EventFault, EventPriority, EventSourceType, Severity, VfStatus,
};
use ves_state::{StateError, StateStore};

const FAULT_DOMAIN: &str = "Fault";

/// One inbound alert notification.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Alert {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

impl Alert {
    pub fn is_resolved(&self) -> bool {
        self.status == "resolved"
    }

    fn label(&self, name: &str) -> &str {
        self.labels.get(name).map(String::as_str).unwrap_or("")
    }

    fn annotation(&self, name: &str) -> &str {
        self.annotations.get(name).map(String::as_str).unwrap_or("")
    }
}

/// Webhook notification body: a list of alerts.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AlertData {
    #[serde(default)]
    pub alerts: Vec<Alert>,
}

/// Result of a fault-storage operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreOutcome {
    InError,
    AlreadyExist,
    Stored,
    Cleared,
    NotExist,
}

/// Deferred state mutation, to run only after the event was successfully
/// posted.
pub type CommitFn = Box<dyn FnOnce() -> Result<(), StateError> + Send>;

fn severity_to_priority(severity: Severity) -> EventPriority {
    match severity {
        Severity::Critical => EventPriority::High,
        Severity::Major => EventPriority::Medium,
        Severity::Minor | Severity::Warning => EventPriority::Low,
        Severity::Normal => EventPriority::Normal,
    }
}

/// Maps alert fingerprints to stable fault ids.
pub struct FaultManager {
    state: StateStore,
    event: EventConfig,
    /// Collapses concurrent stores of the same fault name to the first.
    lock: Mutex<()>,
}

impl FaultManager {
    pub fn new(event: EventConfig, state: StateStore) -> Self {
        FaultManager {
            state,
            event,
            lock: Mutex::new(()),
        }
    }

    pub fn event_config(&self) -> &EventConfig {
        &self.event
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// Store `fault_name` unless already present; allocates a fresh fault
    /// id and initialises its sequence/start-epoch record.
    fn store_fault(&self, fault_name: &str) -> (StoreOutcome, i32) {
        let _guard = self.lock.lock_or_panic();
        let existing = self.state.fault_id(fault_name);
        if existing != 0 {
            warn!(fault = %fault_name, id = existing, "Fault name already exists");
            return (StoreOutcome::AlreadyExist, existing);
        }
        let id = match self.state.next_fault_index() {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "Cannot allocate fault index");
                return (StoreOutcome::InError, 0);
            }
        };
        if let Err(e) = self.state.store_fault(fault_name, id) {
            warn!(error = %e, "Cannot store fault");
            return (StoreOutcome::InError, 0);
        }
        info!(fault = %fault_name, id, "Stored fault");
        (StoreOutcome::Stored, id)
    }

    /// Resolve `fault_name` to its id for a clearing alert. The deletion
    /// itself happens in the commit phase.
    fn clear_fault(&self, fault_name: &str) -> (StoreOutcome, i32) {
        let _guard = self.lock.lock_or_panic();
        let id = self.state.fault_id(fault_name);
        if id == 0 {
            warn!(fault = %fault_name, "Clearing a fault name not present in storage");
            (StoreOutcome::NotExist, 0)
        } else {
            info!(fault = %fault_name, id, "Clearing fault");
            (StoreOutcome::Cleared, id)
        }
    }
}

/// Canonical fault identity: `<id>_<service>_<sourceName>`, with any
/// dynamic `=value` tail of the service annotation dropped.
fn build_fault_name(id: &str, service: &str, source_name: &str) -> String {
    let service = match service.find('=') {
        Some(idx) => &service[..idx],
        None => service,
    };
    format!("{id}_{service}_{source_name}")
}

/// Pair the `_`-separated names of `aai_mapping` with the values encoded
/// in the `service` annotation (first `_` and first `=` both act as value
/// separators, further values split on `*`).
fn build_additional_infos(service: &str, aai_mapping: &str) -> Vec<EventField> {
    let service = service.replacen('_', "*", 1).replacen('=', "*", 1);
    let values: Vec<&str> = service.split('*').collect();
    let names: Vec<&str> = aai_mapping.split('_').collect();

    if values.len() != names.len() + 1 {
        warn!("Incorrect information in alert service field");
        return Vec::new();
    }
    names
        .iter()
        .zip(values.iter().skip(1))
        .map(|(name, value)| EventField {
            name: name.to_string(),
            value: value.to_string(),
        })
        .collect()
}

/// Convert one alert into a VES fault event.
///
/// Returns the storage outcome, the event when one must be posted, and
/// the commit closure to invoke after the event was successfully sent.
/// Unknown severities and clears of unknown faults produce no event.
pub fn alert_to_fault(
    alert: &Alert,
    manager: &FaultManager,
    naming_codes: &HashMap<String, String>,
) -> (StoreOutcome, Option<EventFault>, Option<CommitFn>) {
    debug!(alertname = %alert.label("alertname"), "Converting alert to fault event");

    let Some(mut severity) = Severity::parse(alert.label("severity")) else {
        warn!(severity = %alert.label("severity"), "Unknown alert severity");
        return (StoreOutcome::InError, None, None);
    };
    let priority = severity_to_priority(severity);

    // Generic alarms carry the system name; specific ones name the VNFC.
    let source_name = match alert.label("VNFC") {
        "" => alert.label("system_name"),
        vnfc => vnfc,
    };
    let service = alert.annotation("service");
    let fault_name = build_fault_name(alert.label("id"), service, source_name);
    let nf_naming_code = manager.event_config().nf_naming_code.clone();

    let (outcome, id, alert_name, specific_problem) = if alert.is_resolved() {
        let (outcome, id) = manager.clear_fault(&fault_name);
        severity = Severity::Normal;
        (
            outcome,
            id,
            alert.annotation("clearAlertName"),
            alert.annotation("clearDescription"),
        )
    } else {
        let (outcome, id) = manager.store_fault(&fault_name);
        (
            outcome,
            id,
            alert.label("alertname"),
            alert.annotation("description"),
        )
    };

    if outcome == StoreOutcome::InError || outcome == StoreOutcome::NotExist {
        return (outcome, None, None);
    }

    let event_name = format!("{FAULT_DOMAIN}_{nf_naming_code}_{alert_name}");
    let ves_id = format!("fault{id:010}");
    let mut fault = EventFault::new(
        event_name,
        ves_id,
        alert_name,
        specific_problem,
        priority,
        severity,
        EventSourceType::VirtualMachine,
        VfStatus::Active,
        source_name,
    );
    fault.header.nf_naming_code = nf_naming_code;
    fault.header.nfc_naming_code = naming_codes.get(source_name).cloned().unwrap_or_default();
    fault.header.sequence = manager.state().fault_sn(id);

    // The start epoch freezes at the first firing event; every later
    // update for the same fault reuses it.
    if outcome == StoreOutcome::Stored {
        if let Err(e) = manager
            .state()
            .set_fault_start_epoch(id, fault.header.start_epoch_microsec)
        {
            warn!(error = %e, "Cannot persist fault start epoch");
            return (StoreOutcome::InError, None, None);
        }
    } else {
        fault.header.start_epoch_microsec = manager.state().fault_start_epoch(id);
    }

    if let Some(aai_mapping) = alert.annotations.get("aaiMapping") {
        let infos = build_additional_infos(service, aai_mapping);
        if !infos.is_empty() {
            fault.fault_fields.alarm_additional_information = infos;
        }
    }

    debug!(
        event_id = %fault.header.event_id,
        sequence = fault.header.sequence,
        "Alert converted"
    );

    let state = manager.state().clone();
    let commit: CommitFn = if outcome == StoreOutcome::Cleared {
        let fault_name = fault_name.clone();
        Box::new(move || {
            debug!(fault = %fault_name, id, "Deleting fault in storage");
            state.delete_fault(&fault_name)
        })
    } else {
        Box::new(move || state.increment_fault_sn(id))
    };

    (outcome, Some(fault), Some(commit))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> FaultManager {
        let event = EventConfig {
            vnf_name: "hsxp5001".to_string(),
            nf_naming_code: "hspx".to_string(),
            ..Default::default()
        };
        FaultManager::new(event, StateStore::single_node())
    }

    fn firing_alert() -> Alert {
        Alert {
            status: "firing".to_string(),
            labels: HashMap::from([
                ("id".to_string(), "201".to_string()),
                ("system_name".to_string(), "TEST1".to_string()),
                ("alertname".to_string(), "NodeFailure".to_string()),
                ("severity".to_string(), "critical".to_string()),
                ("VNFC".to_string(), "vm001".to_string()),
            ]),
            annotations: HashMap::from([
                ("service".to_string(), "NodeSupervision".to_string()),
                ("description".to_string(), "down".to_string()),
            ]),
        }
    }

    fn resolved_alert() -> Alert {
        let mut alert = firing_alert();
        alert.status = "resolved".to_string();
        alert
            .annotations
            .insert("clearAlertName".to_string(), "NodeEndOfFailure".to_string());
        alert
            .annotations
            .insert("clearDescription".to_string(), "up".to_string());
        alert
    }

    #[test]
    fn test_firing_alert_becomes_fault() {
        let manager = manager();
        let (outcome, fault, commit) = alert_to_fault(&firing_alert(), &manager, &HashMap::new());
        assert_eq!(outcome, StoreOutcome::Stored);
        let fault = fault.unwrap();
        assert_eq!(fault.header.event_name, "Fault_hspx_NodeFailure");
        assert_eq!(fault.header.event_id, "fault0000000001");
        assert_eq!(fault.header.source_name, "vm001");
        assert_eq!(fault.header.sequence, 1);
        assert_eq!(fault.header.priority, EventPriority::High);
        assert_eq!(fault.fault_fields.event_severity, Severity::Critical);
        assert_eq!(fault.fault_fields.specific_problem, "down");
        // start epoch was persisted for later updates
        assert_eq!(
            manager.state().fault_start_epoch(1),
            fault.header.start_epoch_microsec
        );
        commit.unwrap()().unwrap();
        assert_eq!(manager.state().fault_sn(1), 2);
    }

    #[test]
    fn test_refiring_keeps_id_and_visible_sequence() {
        let manager = manager();
        let (_, _, commit) = alert_to_fault(&firing_alert(), &manager, &HashMap::new());
        commit.unwrap()().unwrap();

        // The same alert fires again: same id, and the event shows the
        // bumped sequence.
        let (outcome, fault, _) = alert_to_fault(&firing_alert(), &manager, &HashMap::new());
        assert_eq!(outcome, StoreOutcome::AlreadyExist);
        let fault = fault.unwrap();
        assert_eq!(fault.header.event_id, "fault0000000001");
        assert_eq!(fault.header.sequence, 2);
    }

    #[test]
    fn test_refire_before_any_successful_post_keeps_sequence_one() {
        let manager = manager();
        // First conversion succeeds but the post never does, so the commit
        // is never run.
        let (_, first, _) = alert_to_fault(&firing_alert(), &manager, &HashMap::new());
        assert_eq!(first.unwrap().header.sequence, 1);

        let (outcome, fault, _) = alert_to_fault(&firing_alert(), &manager, &HashMap::new());
        assert_eq!(outcome, StoreOutcome::AlreadyExist);
        let fault = fault.unwrap();
        assert_eq!(fault.header.event_id, "fault0000000001");
        assert_eq!(fault.header.sequence, 1);
    }

    #[test]
    fn test_resolve_shares_start_epoch_and_deletes_on_commit() {
        let manager = manager();
        let (_, first, commit) = alert_to_fault(&firing_alert(), &manager, &HashMap::new());
        let first = first.unwrap();
        commit.unwrap()().unwrap();

        let (outcome, fault, commit) = alert_to_fault(&resolved_alert(), &manager, &HashMap::new());
        assert_eq!(outcome, StoreOutcome::Cleared);
        let fault = fault.unwrap();
        assert_eq!(fault.header.event_name, "Fault_hspx_NodeEndOfFailure");
        assert_eq!(fault.header.event_id, "fault0000000001");
        assert_eq!(fault.fault_fields.event_severity, Severity::Normal);
        assert_eq!(fault.fault_fields.specific_problem, "up");
        assert_eq!(
            fault.header.start_epoch_microsec,
            first.header.start_epoch_microsec
        );

        commit.unwrap()().unwrap();
        // The record is gone; a fresh firing allocates a new id.
        assert_eq!(manager.state().fault_id("201_NodeSupervision_vm001"), 0);
        let (outcome, fault, _) = alert_to_fault(&firing_alert(), &manager, &HashMap::new());
        assert_eq!(outcome, StoreOutcome::Stored);
        assert_eq!(fault.unwrap().header.event_id, "fault0000000002");
    }

    #[test]
    fn test_resolve_of_unknown_fault_produces_no_event() {
        let manager = manager();
        let (outcome, fault, commit) =
            alert_to_fault(&resolved_alert(), &manager, &HashMap::new());
        assert_eq!(outcome, StoreOutcome::NotExist);
        assert!(fault.is_none());
        assert!(commit.is_none());
    }

    #[test]
    fn test_unknown_severity_produces_no_event() {
        let manager = manager();
        let mut alert = firing_alert();
        alert
            .labels
            .insert("severity".to_string(), "catastrophic".to_string());
        let (outcome, fault, _) = alert_to_fault(&alert, &manager, &HashMap::new());
        assert_eq!(outcome, StoreOutcome::InError);
        assert!(fault.is_none());
    }

    #[test]
    fn test_source_name_falls_back_to_system_name() {
        let manager = manager();
        let mut alert = firing_alert();
        alert.labels.remove("VNFC");
        let (_, fault, _) = alert_to_fault(&alert, &manager, &HashMap::new());
        assert_eq!(fault.unwrap().header.source_name, "TEST1");
    }

    #[test]
    fn test_service_value_dropped_from_fault_name() {
        assert_eq!(
            build_fault_name("201", "NodeSupervision=ope-2", "vm001"),
            "201_NodeSupervision_vm001"
        );
        assert_eq!(
            build_fault_name("201", "NodeSupervision", "vm001"),
            "201_NodeSupervision_vm001"
        );
    }

    #[test]
    fn test_additional_infos_pairing() {
        // underscore encoding: Name_val1*val2
        let infos = build_additional_infos("LinkDown_eth0*card1", "interface_card");
        assert_eq!(
            infos,
            vec![
                EventField {
                    name: "interface".to_string(),
                    value: "eth0".to_string()
                },
                EventField {
                    name: "card".to_string(),
                    value: "card1".to_string()
                },
            ]
        );
        // equals encoding: Name=value
        let infos = build_additional_infos("NodeSupervision=ope-2", "vnfc");
        assert_eq!(
            infos,
            vec![EventField {
                name: "vnfc".to_string(),
                value: "ope-2".to_string()
            }]
        );
        // arity mismatch yields nothing
        assert!(build_additional_infos("NodeSupervision", "a_b").is_empty());
    }

    #[test]
    fn test_aai_mapping_attached_to_event() {
        let manager = manager();
        let mut alert = firing_alert();
        alert
            .annotations
            .insert("service".to_string(), "NodeSupervision=ope-2".to_string());
        alert
            .annotations
            .insert("aaiMapping".to_string(), "vnfc".to_string());
        let (_, fault, _) = alert_to_fault(&alert, &manager, &HashMap::new());
        let fault = fault.unwrap();
        assert_eq!(
            fault.fault_fields.alarm_additional_information,
            vec![EventField {
                name: "vnfc".to_string(),
                value: "ope-2".to_string()
            }]
        );
    }

    #[test]
    fn test_naming_codes_resolved_for_source() {
        let manager = manager();
        let codes = HashMap::from([("vm001".to_string(), "oam".to_string())]);
        let (_, fault, _) = alert_to_fault(&firing_alert(), &manager, &codes);
        let fault = fault.unwrap();
        assert_eq!(fault.header.nf_naming_code, "hspx");
        assert_eq!(fault.header.nfc_naming_code, "oam");
    }
}
