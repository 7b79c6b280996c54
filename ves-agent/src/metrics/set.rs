// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Builder assembling measurement events from individual samples.
//!
//! A sample is addressed by a dotted target path into the measurement
//! field block (`CPUUsageArray.PercentUsage`). Path segments are matched
//! case-insensitively against an explicit field registry; a segment that
//! lands on an array selects (or appends) the entry identified by the
//! composite key, and the final segment must be a float field. Key names
//! that do not exist on an entry type are ignored, so one key set can
//! address differently-shaped arrays.

use std::collections::BTreeMap;
use std::time::SystemTime;

use ves_event::{
    CpuUsage, DiskUsage, EventMeasurements, FilesystemUsage, JsonObject, JsonObjectInstance, Key,
    LatencyBucketMeasure, MeasurementFields, MemoryUsage, ValuesAreSuspect, VnicPerformance,
};

/// Composite key selecting one entry of a measurement array.
pub type MeasKeys = BTreeMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum SetError {
    #[error("target cannot be empty")]
    EmptyTarget,
    #[error("source cannot be empty")]
    EmptySource,
    #[error("unknown field {0:?} in target path")]
    UnknownField(String),
    #[error("target path ends before reaching a numeric field")]
    IncompletePath,
    #[error("value left over after the numeric field {0:?}")]
    TrailingPath(String),
    #[error("AdditionalObjects arguments cannot be empty")]
    EmptyObjectArgs,
    #[error("cannot create measurement event: {0}")]
    Factory(anyhow::Error),
}

/// Where a path segment landed.
enum Slot<'a> {
    Struct(&'a mut dyn FieldMap),
    List(&'a mut dyn KeyedList),
    Float(&'a mut f64),
    OptFloat(&'a mut Option<f64>),
}

/// Field-by-name access over one measurement struct.
trait FieldMap {
    fn slot(&mut self, field: &str) -> Option<Slot<'_>>;
}

/// An array whose entries are identified by key fields.
trait KeyedList {
    fn find_or_append(&mut self, keys: &MeasKeys) -> &mut dyn FieldMap;
}

/// Key-field access over one array entry.
trait KeyedEntry {
    /// Value of the key field, when the entry type has it.
    fn key(&self, name: &str) -> Option<String>;
    /// Set a key field; ignored when the entry type does not have it.
    fn set_key(&mut self, name: &str, value: &str);
}

impl<T: FieldMap + KeyedEntry + Default> KeyedList for Vec<T> {
    fn find_or_append(&mut self, keys: &MeasKeys) -> &mut dyn FieldMap {
        // An entry matches when every key it knows about agrees; keys the
        // entry type does not carry are ignored.
        let found = self.iter().position(|entry| {
            keys.iter()
                .all(|(name, value)| entry.key(name).is_none_or(|have| have == *value))
        });
        let idx = match found {
            Some(idx) => idx,
            None => {
                let mut entry = T::default();
                for (name, value) in keys {
                    entry.set_key(name, value);
                }
                self.push(entry);
                self.len() - 1
            }
        };
        &mut self[idx]
    }
}

macro_rules! field_map {
    ($ty:ty { $($name:literal => $kind:ident $field:ident),* $(,)? }) => {
        impl FieldMap for $ty {
            fn slot(&mut self, field: &str) -> Option<Slot<'_>> {
                match field.to_ascii_lowercase().as_str() {
                    $($name => Some(field_map!(@slot $kind self.$field)),)*
                    _ => None,
                }
            }
        }
    };
    (@slot float $field:expr) => { Slot::Float(&mut $field) };
    (@slot opt $field:expr) => { Slot::OptFloat(&mut $field) };
    (@slot list $field:expr) => { Slot::List(&mut $field) };
}

macro_rules! keyed_entry {
    ($ty:ty { $($name:literal => $field:ident),* $(,)? }) => {
        impl KeyedEntry for $ty {
            fn key(&self, name: &str) -> Option<String> {
                match name.to_ascii_lowercase().as_str() {
                    $($name => Some(self.$field.clone()),)*
                    _ => None,
                }
            }
            fn set_key(&mut self, name: &str, value: &str) {
                match name.to_ascii_lowercase().as_str() {
                    $($name => self.$field = value.to_string(),)*
                    _ => {}
                }
            }
        }
    };
}

field_map!(MeasurementFields {
    "cpuusagearray" => list cpu_usage_array,
    "diskusagearray" => list disk_usage_array,
    "filesystemusagearray" => list filesystem_usage_array,
    "latencydistribution" => list latency_distribution,
    "memoryusagearray" => list memory_usage_array,
    "vnicperformancearray" => list v_nic_performance_array,
    "meanrequestlatency" => opt mean_request_latency,
    "measurementinterval" => float measurement_interval,
    "measurementsforvfscalingversion" => float measurements_for_vf_scaling_version,
    "requestrate" => opt request_rate,
});

field_map!(CpuUsage {
    "cpuidle" => opt cpu_idle,
    "cpuusageinterrupt" => opt cpu_usage_interrupt,
    "cpuusagenice" => opt cpu_usage_nice,
    "cpuusagesoftirq" => opt cpu_usage_soft_irq,
    "cpuusagesteal" => opt cpu_usage_steal,
    "cpuusagesystem" => opt cpu_usage_system,
    "cpuusageuser" => opt cpu_usage_user,
    "cpuwait" => opt cpu_wait,
    "percentusage" => float percent_usage,
});
keyed_entry!(CpuUsage { "cpuidentifier" => cpu_identifier });

field_map!(MemoryUsage {
    "memorybuffered" => opt memory_buffered,
    "memorycached" => opt memory_cached,
    "memoryconfigured" => opt memory_configured,
    "memoryfree" => float memory_free,
    "memoryslabrecl" => opt memory_slab_recl,
    "memoryslabunrecl" => opt memory_slab_unrecl,
    "memoryused" => float memory_used,
});
keyed_entry!(MemoryUsage { "vmidentifier" => vm_identifier });

field_map!(DiskUsage {
    "diskiotimeavg" => opt disk_io_time_avg,
    "diskiotimelast" => opt disk_io_time_last,
    "diskiotimemax" => opt disk_io_time_max,
    "diskiotimemin" => opt disk_io_time_min,
    "diskmergedreadavg" => opt disk_merged_read_avg,
    "diskmergedreadlast" => opt disk_merged_read_last,
    "diskmergedreadmax" => opt disk_merged_read_max,
    "diskmergedreadmin" => opt disk_merged_read_min,
    "diskmergedwriteavg" => opt disk_merged_write_avg,
    "diskmergedwritelast" => opt disk_merged_write_last,
    "diskmergedwritemax" => opt disk_merged_write_max,
    "diskmergedwritemin" => opt disk_merged_write_min,
    "diskoctetsreadavg" => opt disk_octets_read_avg,
    "diskoctetsreadlast" => opt disk_octets_read_last,
    "diskoctetsreadmax" => opt disk_octets_read_max,
    "diskoctetsreadmin" => opt disk_octets_read_min,
    "diskoctetswriteavg" => opt disk_octets_write_avg,
    "diskoctetswritelast" => opt disk_octets_write_last,
    "diskoctetswritemax" => opt disk_octets_write_max,
    "diskoctetswritemin" => opt disk_octets_write_min,
    "diskopsreadavg" => opt disk_ops_read_avg,
    "diskopsreadlast" => opt disk_ops_read_last,
    "diskopsreadmax" => opt disk_ops_read_max,
    "diskopsreadmin" => opt disk_ops_read_min,
    "diskopswriteavg" => opt disk_ops_write_avg,
    "diskopswritelast" => opt disk_ops_write_last,
    "diskopswritemax" => opt disk_ops_write_max,
    "diskopswritemin" => opt disk_ops_write_min,
    "diskpendingoperationsavg" => opt disk_pending_operations_avg,
    "diskpendingoperationslast" => opt disk_pending_operations_last,
    "diskpendingoperationsmax" => opt disk_pending_operations_max,
    "diskpendingoperationsmin" => opt disk_pending_operations_min,
    "disktimereadavg" => opt disk_time_read_avg,
    "disktimereadlast" => opt disk_time_read_last,
    "disktimereadmax" => opt disk_time_read_max,
    "disktimereadmin" => opt disk_time_read_min,
    "disktimewriteavg" => opt disk_time_write_avg,
    "disktimewritelast" => opt disk_time_write_last,
    "disktimewritemax" => opt disk_time_write_max,
    "disktimewritemin" => opt disk_time_write_min,
});
keyed_entry!(DiskUsage { "diskidentifier" => disk_identifier });

field_map!(FilesystemUsage {
    "blockconfigured" => float block_configured,
    "blockiops" => float block_iops,
    "blockused" => float block_used,
    "ephemeralconfigured" => float ephemeral_configured,
    "ephemeraliops" => float ephemeral_iops,
    "ephemeralused" => float ephemeral_used,
});
keyed_entry!(FilesystemUsage { "filesystemname" => filesystem_name });

field_map!(VnicPerformance {
    "receivedbroadcastpacketsaccumulated" => opt received_broadcast_packets_accumulated,
    "receivedbroadcastpacketsdelta" => opt received_broadcast_packets_delta,
    "receiveddiscardedpacketsaccumulated" => opt received_discarded_packets_accumulated,
    "receiveddiscardedpacketsdelta" => opt received_discarded_packets_delta,
    "receivederrorpacketsaccumulated" => opt received_error_packets_accumulated,
    "receivederrorpacketsdelta" => opt received_error_packets_delta,
    "receivedmulticastpacketsaccumulated" => opt received_multicast_packets_accumulated,
    "receivedmulticastpacketsdelta" => opt received_multicast_packets_delta,
    "receivedoctetsaccumulated" => opt received_octets_accumulated,
    "receivedoctetsdelta" => opt received_octets_delta,
    "receivedtotalpacketsaccumulated" => opt received_total_packets_accumulated,
    "receivedtotalpacketsdelta" => opt received_total_packets_delta,
    "receivedunicastpacketsaccumulated" => opt received_unicast_packets_accumulated,
    "receivedunicastpacketsdelta" => opt received_unicast_packets_delta,
    "transmittedbroadcastpacketsaccumulated" => opt transmitted_broadcast_packets_accumulated,
    "transmittedbroadcastpacketsdelta" => opt transmitted_broadcast_packets_delta,
    "transmitteddiscardedpacketsaccumulated" => opt transmitted_discarded_packets_accumulated,
    "transmitteddiscardedpacketsdelta" => opt transmitted_discarded_packets_delta,
    "transmittederrorpacketsaccumulated" => opt transmitted_error_packets_accumulated,
    "transmittederrorpacketsdelta" => opt transmitted_error_packets_delta,
    "transmittedmulticastpacketsaccumulated" => opt transmitted_multicast_packets_accumulated,
    "transmittedmulticastpacketsdelta" => opt transmitted_multicast_packets_delta,
    "transmittedoctetsaccumulated" => opt transmitted_octets_accumulated,
    "transmittedoctetsdelta" => opt transmitted_octets_delta,
    "transmittedtotalpacketsaccumulated" => opt transmitted_total_packets_accumulated,
    "transmittedtotalpacketsdelta" => opt transmitted_total_packets_delta,
    "transmittedunicastpacketsaccumulated" => opt transmitted_unicast_packets_accumulated,
    "transmittedunicastpacketsdelta" => opt transmitted_unicast_packets_delta,
});

impl KeyedEntry for VnicPerformance {
    fn key(&self, name: &str) -> Option<String> {
        match name.to_ascii_lowercase().as_str() {
            "vnicidentifier" => Some(self.v_nic_identifier.clone()),
            "valuesaresuspect" => Some(
                match self.values_are_suspect {
                    ValuesAreSuspect::True => "true",
                    ValuesAreSuspect::False => "false",
                }
                .to_string(),
            ),
            _ => None,
        }
    }

    fn set_key(&mut self, name: &str, value: &str) {
        match name.to_ascii_lowercase().as_str() {
            "vnicidentifier" => self.v_nic_identifier = value.to_string(),
            "valuesaresuspect" => {
                self.values_are_suspect = if value == "true" {
                    ValuesAreSuspect::True
                } else {
                    ValuesAreSuspect::False
                };
            }
            _ => {}
        }
    }
}

field_map!(LatencyBucketMeasure {
    "countsinthebucket" => float counts_in_the_bucket,
    "highendoflatencybucket" => opt high_end_of_latency_bucket,
    "lowendoflatencybucket" => opt low_end_of_latency_bucket,
});

impl KeyedEntry for LatencyBucketMeasure {
    fn key(&self, _name: &str) -> Option<String> {
        None
    }
    fn set_key(&mut self, _name: &str, _value: &str) {}
}

fn assign(slot: Slot<'_>, path: &[&str], value: f64, keys: &MeasKeys) -> Result<(), SetError> {
    match slot {
        Slot::Float(field) => {
            if let Some(extra) = path.first() {
                return Err(SetError::TrailingPath(extra.to_string()));
            }
            *field = value;
            Ok(())
        }
        Slot::OptFloat(field) => {
            if let Some(extra) = path.first() {
                return Err(SetError::TrailingPath(extra.to_string()));
            }
            *field = Some(value);
            Ok(())
        }
        Slot::Struct(fields) => {
            let (head, rest) = path.split_first().ok_or(SetError::IncompletePath)?;
            let slot = fields
                .slot(head)
                .ok_or_else(|| SetError::UnknownField(head.to_string()))?;
            assign(slot, rest, value, keys)
        }
        Slot::List(list) => {
            let entry = list.find_or_append(keys);
            let (head, rest) = path.split_first().ok_or(SetError::IncompletePath)?;
            let slot = entry
                .slot(head)
                .ok_or_else(|| SetError::UnknownField(head.to_string()))?;
            assign(slot, rest, value, keys)
        }
    }
}

fn keys_to_object_keys(keys: &MeasKeys) -> Vec<Key> {
    keys.iter()
        .map(|(name, value)| Key {
            key_name: name.clone(),
            key_order: None,
            key_value: Some(value.clone()),
        })
        .collect()
}

fn keys_match_object_keys(keys: &MeasKeys, object_keys: &[Key]) -> bool {
    if object_keys.len() != keys.len() {
        return false;
    }
    object_keys.iter().all(|key| {
        keys.get(&key.key_name)
            .is_some_and(|value| key.key_value.as_deref() == Some(value))
    })
}

/// Assembles one `EventMeasurements` per distinct `(source, timestamp)`,
/// creating them on demand through the provided factory.
pub struct MeasurementSetBuilder<F> {
    set: Vec<EventMeasurements>,
    create: F,
}

impl<F> MeasurementSetBuilder<F>
where
    F: Fn(&str, SystemTime) -> anyhow::Result<EventMeasurements>,
{
    pub fn new(create: F) -> Self {
        MeasurementSetBuilder {
            set: Vec::new(),
            create,
        }
    }

    fn find_or_create(
        &mut self,
        vm_id: &str,
        timestamp: SystemTime,
    ) -> Result<&mut EventMeasurements, SetError> {
        let micros = ves_common::time::epoch_micros_at(timestamp);
        let found = self
            .set
            .iter()
            .position(|evt| evt.header.last_epoch_microsec == micros && evt.header.source_name == vm_id);
        let idx = match found {
            Some(idx) => idx,
            None => {
                let event = (self.create)(vm_id, timestamp).map_err(SetError::Factory)?;
                self.set.push(event);
                self.set.len() - 1
            }
        };
        Ok(&mut self.set[idx])
    }

    /// Insert one sample at `target` for VM `vm_id` at `timestamp`; `keys`
    /// selects (or initialises) array entries along the path.
    pub fn set(
        &mut self,
        target: &str,
        vm_id: &str,
        timestamp: SystemTime,
        value: f64,
        keys: &MeasKeys,
    ) -> Result<(), SetError> {
        if target.is_empty() {
            return Err(SetError::EmptyTarget);
        }
        if vm_id.is_empty() {
            return Err(SetError::EmptySource);
        }
        let event = self.find_or_create(vm_id, timestamp)?;
        let segments: Vec<&str> = target.split('.').collect();
        assign(
            Slot::Struct(&mut event.measurement_fields),
            &segments,
            value,
            keys,
        )
    }

    /// Insert one sample into `additionalObjects[object_name]`, in the
    /// instance identified by `keys`, under the `object_instance` entry.
    pub fn set_additional_object(
        &mut self,
        vm_id: &str,
        object_name: &str,
        object_instance: &str,
        timestamp: SystemTime,
        value: f64,
        keys: &MeasKeys,
    ) -> Result<(), SetError> {
        if vm_id.is_empty() || object_name.is_empty() || object_instance.is_empty() {
            return Err(SetError::EmptyObjectArgs);
        }
        let event = self.find_or_create(vm_id, timestamp)?;
        let objects = &mut event.measurement_fields.additional_objects;

        let object = match objects.iter().position(|obj| obj.object_name == object_name) {
            Some(idx) => &mut objects[idx],
            None => {
                objects.push(JsonObject {
                    object_name: object_name.to_string(),
                    ..Default::default()
                });
                let idx = objects.len() - 1;
                &mut objects[idx]
            }
        };

        let instance = match object
            .object_instances
            .iter()
            .position(|inst| keys_match_object_keys(keys, &inst.object_keys))
        {
            Some(idx) => &mut object.object_instances[idx],
            None => {
                object.object_instances.push(JsonObjectInstance {
                    object_keys: keys_to_object_keys(keys),
                    ..Default::default()
                });
                let idx = object.object_instances.len() - 1;
                &mut object.object_instances[idx]
            }
        };

        instance
            .object_instance
            .insert(object_instance.to_string(), serde_json::json!(value));
        Ok(())
    }

    /// The assembled measurement events.
    pub fn into_measurements(self) -> Vec<EventMeasurements> {
        self.set
    }
}
