// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! `measurementsForVfScaling` event model. Field blocks follow schema
//! 28.4.1; every array entry type carries its natural identifier field
//! plus the measured scalars.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::event::{EventDomain, EventField, EventHeader, EventPriority};

/// Version of the `measurementsForVfScalingFields` block.
pub const MEASUREMENT_FIELDS_VERSION: f64 = 2.0;

/// Usage of an identified CPU.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuUsage {
    pub cpu_identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_idle: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_usage_interrupt: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_usage_nice: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_usage_soft_irq: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_usage_steal: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_usage_system: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_usage_user: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_wait: Option<f64>,
    /// Aggregate cpu usage of the virtual machine.
    pub percent_usage: f64,
}

/// Memory usage of an identified virtual machine.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_buffered: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_cached: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_configured: Option<f64>,
    pub memory_free: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_slab_recl: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_slab_unrecl: Option<f64>,
    pub memory_used: f64,
    pub vm_identifier: String,
}

/// Usage of an identified disk.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskUsage {
    pub disk_identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_io_time_avg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_io_time_last: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_io_time_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_io_time_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_merged_read_avg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_merged_read_last: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_merged_read_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_merged_read_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_merged_write_avg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_merged_write_last: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_merged_write_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_merged_write_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_octets_read_avg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_octets_read_last: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_octets_read_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_octets_read_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_octets_write_avg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_octets_write_last: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_octets_write_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_octets_write_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_ops_read_avg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_ops_read_last: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_ops_read_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_ops_read_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_ops_write_avg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_ops_write_last: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_ops_write_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_ops_write_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_pending_operations_avg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_pending_operations_last: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_pending_operations_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_pending_operations_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_time_read_avg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_time_read_last: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_time_read_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_time_read_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_time_write_avg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_time_write_last: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_time_write_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_time_write_min: Option<f64>,
}

/// Filesystem usage of an identified virtual machine.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesystemUsage {
    pub block_configured: f64,
    pub block_iops: f64,
    pub block_used: f64,
    pub ephemeral_configured: f64,
    pub ephemeral_iops: f64,
    pub ephemeral_used: f64,
    pub filesystem_name: String,
}

/// Performance and errors of an identified virtual network interface card.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VnicPerformance {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_broadcast_packets_accumulated: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_broadcast_packets_delta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_discarded_packets_accumulated: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_discarded_packets_delta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_error_packets_accumulated: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_error_packets_delta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_multicast_packets_accumulated: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_multicast_packets_delta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_octets_accumulated: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_octets_delta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_total_packets_accumulated: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_total_packets_delta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_unicast_packets_accumulated: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_unicast_packets_delta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transmitted_broadcast_packets_accumulated: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transmitted_broadcast_packets_delta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transmitted_discarded_packets_accumulated: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transmitted_discarded_packets_delta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transmitted_error_packets_accumulated: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transmitted_error_packets_delta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transmitted_multicast_packets_accumulated: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transmitted_multicast_packets_delta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transmitted_octets_accumulated: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transmitted_octets_delta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transmitted_total_packets_accumulated: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transmitted_total_packets_delta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transmitted_unicast_packets_accumulated: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transmitted_unicast_packets_delta: Option<f64>,
    /// Whether the counters are likely inaccurate (overflow or similar).
    pub values_are_suspect: ValuesAreSuspect,
    #[serde(rename = "vNicIdentifier")]
    pub v_nic_identifier: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValuesAreSuspect {
    #[default]
    #[serde(rename = "false")]
    False,
    #[serde(rename = "true")]
    True,
}

/// Number of counts falling within a defined latency bucket.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyBucketMeasure {
    pub counts_in_the_bucket: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high_end_of_latency_bucket: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_end_of_latency_bucket: Option<f64>,
}

/// Number of times an identified feature was used over the interval.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeaturesInUse {
    pub feature_identifier: String,
    pub feature_utilization: i64,
}

/// Number of times an identified codec was used over the interval.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodecsInUse {
    pub codec_identifier: String,
    pub number_in_use: i64,
}

/// Key tuple naming one dimension of a json-object instance.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Key {
    pub key_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_order: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_value: Option<String>,
}

/// One instance of a json object, identified by its ordered key set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonObjectInstance {
    pub object_instance: BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_instance_epoch_microsec: Option<f64>,
    pub object_keys: Vec<Key>,
}

/// Json object schema, name and meta-information along with instances.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonObject {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nf_subscribed_object_name: Option<String>,
    #[serde(rename = "nfSubscriptionId", skip_serializing_if = "Option::is_none")]
    pub nf_subscription_id: Option<String>,
    pub object_instances: Vec<JsonObjectInstance>,
    pub object_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_schema: Option<String>,
    #[serde(rename = "objectSchemaUrl", skip_serializing_if = "Option::is_none")]
    pub object_schema_url: Option<String>,
}

/// An array of name/value pairs along with a name for the array.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedArrayOfFields {
    pub array_of_fields: Vec<EventField>,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementFields {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_fields: Vec<EventField>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_measurements: Vec<NamedArrayOfFields>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_objects: Vec<JsonObject>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub codec_usage_array: Vec<CodecsInUse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrent_sessions: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configured_entities: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cpu_usage_array: Vec<CpuUsage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disk_usage_array: Vec<DiskUsage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub feature_usage_array: Vec<FeaturesInUse>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filesystem_usage_array: Vec<FilesystemUsage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub latency_distribution: Vec<LatencyBucketMeasure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_request_latency: Option<f64>,
    /// Interval over which measurements are reported, in seconds.
    pub measurement_interval: f64,
    pub measurements_for_vf_scaling_version: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub memory_usage_array: Vec<MemoryUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_of_media_ports_in_use: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vnfc_scaling_metric: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub v_nic_performance_array: Vec<VnicPerformance>,
}

impl Default for MeasurementFields {
    fn default() -> Self {
        MeasurementFields {
            additional_fields: Vec::new(),
            additional_measurements: Vec::new(),
            additional_objects: Vec::new(),
            codec_usage_array: Vec::new(),
            concurrent_sessions: None,
            configured_entities: None,
            cpu_usage_array: Vec::new(),
            disk_usage_array: Vec::new(),
            feature_usage_array: Vec::new(),
            filesystem_usage_array: Vec::new(),
            latency_distribution: Vec::new(),
            mean_request_latency: None,
            measurement_interval: 0.0,
            measurements_for_vf_scaling_version: MEASUREMENT_FIELDS_VERSION,
            memory_usage_array: Vec::new(),
            number_of_media_ports_in_use: None,
            request_rate: None,
            vnfc_scaling_metric: None,
            v_nic_performance_array: Vec::new(),
        }
    }
}

/// A metric event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventMeasurements {
    #[serde(rename = "commonEventHeader")]
    pub header: EventHeader,
    #[serde(rename = "measurementsForVfScalingFields")]
    pub measurement_fields: MeasurementFields,
}

impl EventMeasurements {
    /// New measurement event covering `[start, end]`.
    pub fn new(
        name: impl Into<String>,
        id: impl Into<String>,
        source_name: impl Into<String>,
        interval: Duration,
        start: SystemTime,
        end: SystemTime,
    ) -> Self {
        let mut header = EventHeader::new(
            EventDomain::MeasurementsForVfScaling,
            id,
            name,
            source_name,
            EventPriority::Normal,
        );
        header.start_epoch_microsec = ves_common::time::epoch_micros_at(start);
        header.last_epoch_microsec = ves_common::time::epoch_micros_at(end);
        EventMeasurements {
            header,
            measurement_fields: MeasurementFields {
                measurement_interval: interval.as_secs_f64(),
                ..Default::default()
            },
        }
    }
}
