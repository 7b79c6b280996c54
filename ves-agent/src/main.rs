// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ves_agent::agent::Agent;
use ves_agent::config::{self, AgentConfig, Args};
use ves_agent::metrics::PromClient;
use ves_agent::rest::RestServer;
use ves_collector::{Collector, CollectorCluster};
use ves_event::EventSchema;
use ves_state::StateStore;

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_schema_document(config: &AgentConfig) -> anyhow::Result<Option<serde_json::Value>> {
    if config.schema_file.is_empty() {
        warn!("No schema file configured, outgoing payloads are not validated");
        return Ok(None);
    }
    let raw = std::fs::read_to_string(&config.schema_file)
        .with_context(|| format!("cannot read schema file {}", config.schema_file))?;
    Ok(Some(serde_json::from_str(&raw).with_context(|| {
        format!("cannot parse schema file {}", config.schema_file)
    })?))
}

fn build_cluster(
    config: &AgentConfig,
    schema_document: Option<&serde_json::Value>,
) -> anyhow::Result<CollectorCluster> {
    let ca_cert = if config.ca_cert.is_empty() {
        None
    } else {
        Some(
            std::fs::read_to_string(&config.ca_cert)
                .with_context(|| format!("cannot read CA certificate {}", config.ca_cert))?,
        )
    };

    let schema_for_collector = || -> anyhow::Result<Option<EventSchema>> {
        schema_document
            .map(|document| EventSchema::from_value(document.clone()))
            .transpose()
            .context("cannot compile schema")
    };

    let primary = Collector::new(
        &config.primary_collector,
        &config.event,
        ca_cert.as_deref(),
        schema_for_collector()?,
    )?;
    let backup = if config.backup_collector.is_configured() {
        Some(Collector::new(
            &config.backup_collector,
            &config.event,
            ca_cert.as_deref(),
            schema_for_collector()?,
        )?)
    } else {
        None
    };

    Ok(CollectorCluster::new(
        primary,
        backup,
        config.event.max_missed,
        Duration::from_secs(config.event.retry_interval_secs),
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = config::load(&args)?;
    init_tracing(config.debug);

    let schema_document = load_schema_document(&config)?;
    let cluster = build_cluster(&config, schema_document.as_ref())?;

    if let Some(topology) = &config.cluster {
        if !topology.peers.is_empty() {
            warn!(
                node = %topology.id,
                peers = topology.peers.len(),
                "No consensus transport is linked in, running single-node"
            );
        }
    }
    let state = StateStore::single_node();

    let metrics = PromClient::new(
        &config.measurement.prometheus.address,
        Duration::from_secs(config.measurement.prometheus.timeout_secs),
    )?;

    let (alert_tx, alert_rx) = mpsc::channel(1024);
    let rest = RestServer::bind(&config.alert_manager, alert_tx, state.clone()).await?;
    tokio::spawn(rest.run());

    let mut agent = Agent::new(&config, &cluster, metrics, alert_rx, state);
    tokio::select! {
        result = agent.run(&cluster) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            Ok(())
        }
    }
}
