// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Measurement collection: render the rule templates, query the backend
//! over the collection window, and map the resulting series into
//! measurement events.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use handlebars::Handlebars;
use serde_json::json;
use tracing::{debug, info, warn};

use ves_event::{Batch, EventMeasurements};
use ves_state::StateStore;

use crate::config::{MeasurementConfig, MetricRule};
use crate::metrics::prom::{MetricsSource, QueryRange};
use crate::metrics::set::{MeasKeys, MeasurementSetBuilder};
use crate::scheduler::Job;

use ves_event::EventConfig;

#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("bad expression template {template:?}: {reason}")]
    BadTemplate { template: String, reason: String },
    #[error("cannot evaluate vmId: {0}")]
    VmId(String),
    #[error("cannot evaluate key {key:?}: {reason}")]
    Key { key: String, reason: String },
    #[error(transparent)]
    Backend(#[from] crate::metrics::prom::MetricsError),
    #[error(transparent)]
    Set(#[from] crate::metrics::set::SetError),
}

/// Two template registries: strict rendering errors on a missing key,
/// lenient rendering resolves it to the empty string. Parsed templates are
/// cached under their own source text.
struct TemplateCache {
    strict: Handlebars<'static>,
    lenient: Handlebars<'static>,
}

impl TemplateCache {
    fn new() -> Self {
        let mut strict = Handlebars::new();
        strict.set_strict_mode(true);
        TemplateCache {
            strict,
            lenient: Handlebars::new(),
        }
    }

    fn render(
        &mut self,
        template: &str,
        data: &serde_json::Value,
        strict: bool,
    ) -> Result<String, CollectError> {
        let registry = if strict {
            &mut self.strict
        } else {
            &mut self.lenient
        };
        if !registry.has_template(template) {
            registry
                .register_template_string(template, template)
                .map_err(|e| CollectError::BadTemplate {
                    template: template.to_string(),
                    reason: e.to_string(),
                })?;
        }
        registry
            .render(template, data)
            .map_err(|e| CollectError::BadTemplate {
                template: template.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Job collecting metrics from the backend and shaping them into
/// measurement events.
pub struct MetricsCollector<S> {
    state: StateStore,
    source: S,
    rules: Vec<MetricRule>,
    max_buffering: Duration,
    event_name: String,
    vnf_name: String,
    nf_naming_code: String,
    naming_codes: HashMap<String, String>,
    templates: TemplateCache,
}

impl<S: MetricsSource> MetricsCollector<S> {
    pub fn new(
        config: &MeasurementConfig,
        event: &EventConfig,
        naming_codes: HashMap<String, String>,
        source: S,
        state: StateStore,
    ) -> Self {
        info!(
            address = %config.prometheus.address,
            rules = config.prometheus.rules.metrics.len(),
            "Initializing measurement collector"
        );
        let rules = config
            .prometheus
            .rules
            .metrics
            .iter()
            .map(|rule| rule.clone().with_defaults(config.prometheus.rules.defaults.as_ref()))
            .collect();
        MetricsCollector {
            state,
            source,
            rules,
            max_buffering: Duration::from_secs(config.max_buffering_secs),
            event_name: format!(
                "{}_{}_Measurements",
                config.domain_abbreviation, event.nf_naming_code
            ),
            vnf_name: event.vnf_name.clone(),
            nf_naming_code: event.nf_naming_code.clone(),
            naming_codes,
            templates: TemplateCache::new(),
        }
    }

    /// Clamp the collection window to the maximum buffering timeframe,
    /// keeping the most recent metrics, truncated to the interval.
    fn adjust_collection_start(
        &self,
        start: SystemTime,
        end: SystemTime,
        interval: Duration,
    ) -> SystemTime {
        if self.max_buffering > Duration::ZERO
            && end.duration_since(start).unwrap_or(Duration::ZERO) > self.max_buffering
        {
            debug!(
                max = self.max_buffering.as_secs(),
                "Rounding collect timeframe"
            );
            return ves_common::time::truncate_to(end - self.max_buffering, interval);
        }
        start
    }

    /// Collect every rule over `[from, to]` into measurement events.
    pub async fn collect_metrics(
        &mut self,
        from: SystemTime,
        to: SystemTime,
        interval: Duration,
    ) -> Result<Vec<EventMeasurements>, CollectError> {
        let from = self.adjust_collection_start(from, to, interval);
        let range = QueryRange {
            start: from,
            end: to,
            step: interval,
        };

        let state = self.state.clone();
        let event_name = self.event_name.clone();
        let nf_naming_code = self.nf_naming_code.clone();
        let naming_codes = self.naming_codes.clone();
        let mut builder = MeasurementSetBuilder::new(move |vm_id, timestamp| {
            let idx = state.next_measurement_index()?;
            let mut event = EventMeasurements::new(
                event_name.clone(),
                format!("Measurements{idx:010}"),
                vm_id,
                interval,
                timestamp - interval,
                timestamp,
            );
            event.header.nf_naming_code = nf_naming_code.clone();
            event.header.nfc_naming_code = naming_codes.get(vm_id).cloned().unwrap_or_default();
            Ok(event)
        });

        info!("Starting metrics collection");
        let started = std::time::Instant::now();
        let rules = self.rules.clone();
        for rule in &rules {
            self.collect_from_rule(&mut builder, rule, &range).await?;
        }
        info!(elapsed_ms = started.elapsed().as_millis() as u64, "Metrics collection completed");
        Ok(builder.into_measurements())
    }

    async fn collect_from_rule(
        &mut self,
        builder: &mut MeasurementSetBuilder<
            impl Fn(&str, SystemTime) -> anyhow::Result<EventMeasurements>,
        >,
        rule: &MetricRule,
        range: &QueryRange,
    ) -> Result<(), CollectError> {
        let mut data = json!({"interval": range.step.as_secs()});
        let expr = self.templates.render(&rule.expr, &data, true)?;

        let matrix = self.source.query_range(&expr, range).await?;

        for series in matrix {
            data["labels"] = json!(series.labels);
            let vm_id = self
                .templates
                .render(&rule.vm_id_label, &data, true)
                .map_err(|e| CollectError::VmId(e.to_string()))?;
            // A series that does not identify its VM belongs to the VNF.
            let vm_id = if vm_id.is_empty() {
                self.vnf_name.clone()
            } else {
                vm_id
            };
            data["vmId"] = json!(vm_id);

            // A target that cannot be evaluated, or evaluates empty, just
            // skips the series.
            let target = match self.templates.render(&rule.target, &data, false) {
                Ok(target) if !target.is_empty() => target,
                Ok(_) => {
                    warn!(rule = %rule.expr, "Empty target, skipping series");
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "Cannot evaluate target, skipping series");
                    continue;
                }
            };

            let key_labels = if target == "AdditionalObjects" {
                &rule.object_keys
            } else {
                &rule.labels
            };
            let mut keys = MeasKeys::new();
            for label in key_labels {
                let value = self
                    .templates
                    .render(&label.expr, &data, true)
                    .map_err(|e| CollectError::Key {
                        key: label.name.clone(),
                        reason: e.to_string(),
                    })?;
                keys.insert(label.name.clone(), value);
            }

            for (timestamp, value) in &series.samples {
                debug!(field = %target, vnfc = %vm_id, value = *value, "Got metric");
                if target == "AdditionalObjects" {
                    builder.set_additional_object(
                        &vm_id,
                        &rule.object_name,
                        &rule.object_instance,
                        *timestamp,
                        *value,
                        &keys,
                    )?;
                } else {
                    builder.set(&target, &vm_id, *timestamp, *value, &keys)?;
                }
            }
        }
        Ok(())
    }
}

impl<S: MetricsSource + Send> Job for MetricsCollector<S> {
    type Output = Batch;

    async fn run(
        &mut self,
        from: SystemTime,
        to: SystemTime,
        interval: Duration,
    ) -> anyhow::Result<Batch> {
        let measurements = self.collect_metrics(from, to, interval).await?;
        Ok(Batch::from(
            measurements.into_iter().map(Into::into).collect::<Vec<_>>(),
        ))
    }
}
