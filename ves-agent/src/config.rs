// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Agent configuration: a YAML file plus command-line/env overrides for
//! the high-traffic knobs. Durations are integer seconds in the file.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde::{Deserialize, Serialize};

use ves_collector::CollectorConfig;
use ves_event::EventConfig;

/// A VES field by name, with a template expression for its value.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub expr: String,
}

/// How to query one metric and map the result into measurement events.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricRule {
    /// Target VES event field, as a dotted path (or `AdditionalObjects`).
    pub target: String,
    /// Backend query expression template.
    pub expr: String,
    /// Template producing the VM (VNFC) identifier from series labels.
    #[serde(rename = "vmId")]
    pub vm_id_label: String,
    /// VES fields mapped from label values; forms the composite array key.
    pub labels: Vec<Label>,
    /// JSON object name, when `target` is `AdditionalObjects`.
    pub object_name: String,
    /// JSON object instance key, when `target` is `AdditionalObjects`.
    pub object_instance: String,
    /// JSON object instance keys, when `target` is `AdditionalObjects`.
    pub object_keys: Vec<Label>,
}

impl MetricRule {
    fn has_label(&self, name: &str) -> bool {
        self.labels.iter().any(|label| label.name == name)
    }

    /// Apply default values field-wise; labels are unioned by name with
    /// the rule-specific one winning.
    pub fn with_defaults(mut self, defaults: Option<&MetricRule>) -> MetricRule {
        let Some(defaults) = defaults else {
            return self;
        };
        if self.target.is_empty() {
            self.target = defaults.target.clone();
        }
        if self.vm_id_label.is_empty() {
            self.vm_id_label = defaults.vm_id_label.clone();
        }
        for label in &defaults.labels {
            if !self.has_label(&label.name) {
                self.labels.push(label.clone());
            }
        }
        self
    }
}

/// Rules plus the defaults merged into each of them.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricRules {
    pub defaults: Option<MetricRule>,
    pub metrics: Vec<MetricRule>,
}

/// Metrics backend parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrometheusConfig {
    /// Base url of the backend's HTTP API.
    pub address: String,
    /// Request timeout, seconds.
    pub timeout_secs: u64,
    pub rules: MetricRules,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        PrometheusConfig {
            address: "http://localhost:9090".to_string(),
            timeout_secs: 30,
            rules: MetricRules::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MeasurementConfig {
    /// `Measurement` or `Mfvs`.
    pub domain_abbreviation: String,
    /// Default collection interval, seconds.
    pub default_interval_secs: u64,
    /// Maximum buffered collection timeframe, seconds. 0 disables.
    pub max_buffering_secs: u64,
    pub prometheus: PrometheusConfig,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        MeasurementConfig {
            domain_abbreviation: "Measurement".to_string(),
            default_interval_secs: 300,
            max_buffering_secs: 3600,
            prometheus: PrometheusConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeartbeatConfig {
    /// Default heartbeat interval, seconds.
    pub default_interval_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        HeartbeatConfig {
            default_interval_secs: 60,
        }
    }
}

/// Alert webhook listener parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertManagerConfig {
    pub bind: String,
    pub path: String,
    pub user: String,
    pub password: String,
}

impl Default for AlertManagerConfig {
    fn default() -> Self {
        AlertManagerConfig {
            bind: "localhost:9095".to_string(),
            path: "/alerts".to_string(),
            user: String::new(),
            password: String::new(),
        }
    }
}

/// One replica of the agent cluster.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Peer {
    pub id: String,
    pub address: String,
}

/// Cluster topology. Absent (or without peers) the agent runs single-node.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterConfig {
    pub id: String,
    pub peers: Vec<Peer>,
    pub debug: bool,
}

impl ClusterConfig {
    /// A topology with peers must name this node among them.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.peers.is_empty() {
            return Ok(());
        }
        if !self.peers.iter().any(|peer| peer.id == self.id) {
            anyhow::bail!("bad cluster configuration: no peer with id {:?} found", self.id);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    pub primary_collector: CollectorConfig,
    pub backup_collector: CollectorConfig,
    pub event: EventConfig,
    pub heartbeat: HeartbeatConfig,
    pub measurement: MeasurementConfig,
    pub alert_manager: AlertManagerConfig,
    pub cluster: Option<ClusterConfig>,
    /// Path to a PEM CA bundle for the collector links.
    pub ca_cert: String,
    /// Path to the VES schema document used to validate outgoing payloads.
    pub schema_file: String,
    pub data_dir: String,
    pub debug: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            primary_collector: CollectorConfig::default(),
            backup_collector: CollectorConfig::default(),
            event: EventConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            measurement: MeasurementConfig::default(),
            alert_manager: AlertManagerConfig::default(),
            cluster: None,
            ca_cert: String::new(),
            schema_file: String::new(),
            data_dir: "/var/lib/ves-agent/data".to_string(),
            debug: false,
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.primary_collector.user.is_empty() || self.primary_collector.password.is_empty() {
            anyhow::bail!(
                "missing required configuration parameter: primaryCollector.user/password"
            );
        }
        if let Some(cluster) = &self.cluster {
            cluster.validate()?;
        }
        Ok(())
    }
}

/// Command-line front. Flags override the configuration file, which in
/// turn overrides built-in defaults.
#[derive(Debug, Parser)]
#[command(name = "ves-agent", about = "VES event reporting agent")]
pub struct Args {
    /// Path to the YAML configuration file.
    #[arg(short, long, env = "VES_CONFIG")]
    pub config: Option<PathBuf>,
    /// Primary collector FQDN.
    #[arg(short = 'f', long, env = "VES_PRIMARYCOLLECTOR_FQDN")]
    pub fqdn: Option<String>,
    /// Primary collector port.
    #[arg(short = 'p', long, env = "VES_PRIMARYCOLLECTOR_PORT")]
    pub port: Option<u16>,
    /// Primary collector user.
    #[arg(short = 'u', long, env = "VES_PRIMARYCOLLECTOR_USER")]
    pub user: Option<String>,
    /// Primary collector password.
    #[arg(short = 'k', long, env = "VES_PRIMARYCOLLECTOR_PASSWORD")]
    pub password: Option<String>,
    /// Heartbeat interval in seconds.
    #[arg(short = 'i', long, env = "VES_HEARTBEAT_DEFAULTINTERVAL")]
    pub heartbeat_interval: Option<u64>,
    /// Measurement interval in seconds.
    #[arg(short = 'm', long, env = "VES_MEASUREMENT_DEFAULTINTERVAL")]
    pub measurement_interval: Option<u64>,
    /// Alert webhook bind address.
    #[arg(long, env = "VES_ALERTMANAGER_BIND")]
    pub bind: Option<String>,
    /// Data directory.
    #[arg(short = 'D', long, env = "VES_DATADIR")]
    pub data_dir: Option<String>,
    /// Activate debug traces.
    #[arg(long, env = "VES_DEBUG")]
    pub debug: bool,
}

/// Load the configuration file (when given) and apply flag overrides.
pub fn load(args: &Args) -> anyhow::Result<AgentConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read configuration file {}", path.display()))?;
            serde_yaml::from_str(&raw)
                .with_context(|| format!("cannot parse configuration file {}", path.display()))?
        }
        None => AgentConfig::default(),
    };

    if let Some(fqdn) = &args.fqdn {
        config.primary_collector.fqdn = fqdn.clone();
    }
    if let Some(port) = args.port {
        config.primary_collector.port = port;
    }
    if let Some(user) = &args.user {
        config.primary_collector.user = user.clone();
    }
    if let Some(password) = &args.password {
        config.primary_collector.password = password.clone();
    }
    if let Some(secs) = args.heartbeat_interval {
        config.heartbeat.default_interval_secs = secs;
    }
    if let Some(secs) = args.measurement_interval {
        config.measurement.default_interval_secs = secs;
    }
    if let Some(bind) = &args.bind {
        config.alert_manager.bind = bind.clone();
    }
    if let Some(data_dir) = &args.data_dir {
        config.data_dir = data_dir.clone();
    }
    if args.debug {
        config.debug = true;
    }

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_defaults_merge() {
        let defaults = MetricRule {
            target: "CPUUsageArray.PercentUsage".to_string(),
            vm_id_label: "{{labels.VNFC}}".to_string(),
            labels: vec![Label {
                name: "CPUIdentifier".to_string(),
                expr: "{{labels.VCID}}".to_string(),
            }],
            ..Default::default()
        };
        let rule = MetricRule {
            expr: "irate(cpu[5m])".to_string(),
            labels: vec![Label {
                name: "CPUIdentifier".to_string(),
                expr: "{{labels.CPU}}".to_string(),
            }],
            ..Default::default()
        };
        let merged = rule.with_defaults(Some(&defaults));
        assert_eq!(merged.target, "CPUUsageArray.PercentUsage");
        assert_eq!(merged.vm_id_label, "{{labels.VNFC}}");
        // Rule-specific label wins over the default of the same name.
        assert_eq!(merged.labels.len(), 1);
        assert_eq!(merged.labels[0].expr, "{{labels.CPU}}");
    }

    #[test]
    fn test_yaml_round_trip() {
        let yaml = r#"
primaryCollector:
  fqdn: collector.example.org
  port: 8443
  secure: true
  user: user
  password: pass
  topic: mytopic
event:
  vnfName: hsxp5001
  nfNamingCode: hsxp
  maxMissed: 1
  retryIntervalSecs: 1
heartbeat:
  defaultIntervalSecs: 5
measurement:
  defaultIntervalSecs: 60
  prometheus:
    address: http://localhost:9090
    rules:
      metrics:
        - expr: cpu_usage
          target: CPUUsageArray.PercentUsage
          vmId: "{{labels.VNFC}}"
          labels:
            - name: CPUIdentifier
              expr: "{{labels.VCID}}"
alertManager:
  bind: "localhost:9095"
"#;
        let config: AgentConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.primary_collector.fqdn, "collector.example.org");
        assert!(config.primary_collector.secure);
        assert_eq!(config.event.max_missed, 1);
        assert_eq!(config.heartbeat.default_interval_secs, 5);
        let rule = &config.measurement.prometheus.rules.metrics[0];
        assert_eq!(rule.vm_id_label, "{{labels.VNFC}}");
        assert!(!config.backup_collector.is_configured());
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let config = AgentConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cluster_topology_must_contain_self() {
        let cluster = ClusterConfig {
            id: "node-3".to_string(),
            peers: vec![Peer {
                id: "node-1".to_string(),
                address: "127.0.0.1:7001".to_string(),
            }],
            debug: false,
        };
        assert!(cluster.validate().is_err());
    }
}
