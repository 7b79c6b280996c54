// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Mutex, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use ves_common::{join_path, Endpoint, MutexExt};
use ves_event::{
    Batch, Command, CommandType, Event, EventConfig, EventSchema,
};

use crate::{ClientError, VesClient};

/// One collector endpoint as it appears in the configuration file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CollectorConfig {
    pub server_root: String,
    pub fqdn: String,
    pub port: u16,
    pub secure: bool,
    pub topic: String,
    pub user: String,
    pub password: String,
}

impl CollectorConfig {
    pub fn is_configured(&self) -> bool {
        !self.fqdn.is_empty()
    }
}

/// Interface the agent loop programs against; implemented by the cluster
/// and by test doubles.
pub trait VesCollector: Send + Sync {
    fn post_event(
        &self,
        event: Event,
    ) -> impl std::future::Future<Output = Result<(), ClientError>> + Send;
    fn post_batch(
        &self,
        batch: Batch,
    ) -> impl std::future::Future<Output = Result<(), ClientError>> + Send;
    /// Measurement interval asked by the server, or zero if the agent's
    /// default applies.
    fn measurement_interval(&self) -> Duration;
    /// Heartbeat interval asked by the server, or zero if the agent's
    /// default applies.
    fn heartbeat_interval(&self) -> Duration;
    fn notify_measurement_interval_changed(&self, tx: mpsc::Sender<Duration>);
    fn notify_heartbeat_interval_changed(&self, tx: mpsc::Sender<Duration>);
}

#[derive(Default)]
struct Intervals {
    heartbeat: Duration,
    measurement: Duration,
}

#[derive(Default)]
struct Subscribers {
    heartbeat: Vec<mpsc::Sender<Duration>>,
    measurement: Vec<mpsc::Sender<Duration>>,
}

#[derive(Serialize)]
struct PostEventRequest {
    event: Event,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PostBatchRequest {
    event_list: Batch,
}

/// One VES collector: a client plus the protocol-level behavior around it.
pub struct Collector {
    topic: String,
    reporting_entity_name: String,
    reporting_entity_id: String,
    client: VesClient,
    intervals: RwLock<Intervals>,
    subscribers: Mutex<Subscribers>,
}

impl Collector {
    /// Build a collector from its configuration. `ca_cert` is a PEM bundle
    /// for collectors signed by a private CA; `schema` validates outgoing
    /// payloads when present.
    pub fn new(
        config: &CollectorConfig,
        event: &EventConfig,
        ca_cert: Option<&str>,
        schema: Option<EventSchema>,
    ) -> anyhow::Result<Collector> {
        info!(fqdn = %config.fqdn, port = config.port, "Initializing collector");
        let scheme = if config.secure {
            info!("Secure VES link using HTTPS");
            "https"
        } else {
            warn!("Insecure VES link using HTTP");
            "http"
        };
        let base_path = join_path(
            "/",
            &format!("{}/eventListener/v5", config.server_root.trim_matches('/')),
        );
        let url: hyper::Uri =
            format!("{scheme}://{}:{}{base_path}", config.fqdn, config.port).parse()?;
        let endpoint = Endpoint::from_url(url)
            .with_basic_auth(config.user.clone(), config.password.clone());
        let connector = ves_common::connector::build_connector(ca_cert)?;

        Ok(Collector {
            topic: config.topic.trim_matches('/').to_string(),
            reporting_entity_name: event.reporting_entity_name.clone(),
            reporting_entity_id: event.reporting_entity_id.clone(),
            client: VesClient::new(endpoint, connector, schema, event.max_size),
            intervals: RwLock::new(Intervals::default()),
            subscribers: Mutex::new(Subscribers::default()),
        })
    }

    /// Send one event to the collector.
    pub async fn post_event(&self, mut event: Event) -> Result<(), ClientError> {
        let header = event.header_mut();
        if header.reporting_entity_name.is_empty() {
            header.reporting_entity_name = self.reporting_entity_name.clone();
        }
        if header.reporting_entity_id.is_empty() {
            header.reporting_entity_id = self.reporting_entity_id.clone();
        }
        debug!(event_id = %event.header().event_id, "Posting event");
        self.do_post(&self.topic, &PostEventRequest { event }).await
    }

    /// Send a list of events in a single request using the batch interface.
    pub async fn post_batch(&self, mut batch: Batch) -> Result<(), ClientError> {
        if batch.is_empty() {
            return Ok(());
        }
        batch.update_reporting_entity_name(&self.reporting_entity_name);
        batch.update_reporting_entity_id(&self.reporting_entity_id);
        debug!(events = batch.len(), "Posting a batch of events");
        self.do_post("eventBatch", &PostBatchRequest { event_list: batch })
            .await
    }

    async fn do_post<T: Serialize>(&self, path: &str, payload: &T) -> Result<(), ClientError> {
        let reply = self.client.post_json(path, payload).await?;
        self.process_commands(&reply.command_list);
        Ok(())
    }

    /// Measurement interval asked by the server, or zero when the agent's
    /// default should be used.
    pub fn measurement_interval(&self) -> Duration {
        self.intervals
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .measurement
    }

    /// Heartbeat interval asked by the server, or zero when the agent's
    /// default should be used.
    pub fn heartbeat_interval(&self) -> Duration {
        self.intervals
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .heartbeat
    }

    /// Subscribe a channel to new measurement intervals. The channel must
    /// be buffered or aggressively consumed: writes never block, a full
    /// channel drops the notification.
    pub fn notify_measurement_interval_changed(&self, tx: mpsc::Sender<Duration>) {
        self.subscribers.lock_or_panic().measurement.push(tx);
    }

    /// Subscribe a channel to new heartbeat intervals; same non-blocking
    /// contract as measurement notifications.
    pub fn notify_heartbeat_interval_changed(&self, tx: mpsc::Sender<Duration>) {
        self.subscribers.lock_or_panic().heartbeat.push(tx);
    }

    fn process_commands(&self, commands: &[Command]) {
        if commands.is_empty() {
            return;
        }
        for command in commands {
            match &command.command_type {
                CommandType::HeartbeatIntervalChange => {
                    let interval =
                        Duration::from_secs(command.heartbeat_interval.unwrap_or(0).max(0) as u64);
                    self.apply_interval_change(interval, true);
                }
                CommandType::MeasurementIntervalChange => {
                    let interval = Duration::from_secs(
                        command.measurement_interval.unwrap_or(0).max(0) as u64,
                    );
                    self.apply_interval_change(interval, false);
                }
                CommandType::ThrottlingSpecification | CommandType::ProvideThrottlingState => {
                    warn!(command = ?command.command_type, "Throttling command not actioned");
                }
                CommandType::Other(kind) => {
                    warn!(command = %kind, "Unsupported command type");
                }
            }
        }
    }

    fn apply_interval_change(&self, interval: Duration, heartbeat: bool) {
        let mut intervals = self.intervals.write().unwrap_or_else(|e| e.into_inner());
        let current = if heartbeat {
            &mut intervals.heartbeat
        } else {
            &mut intervals.measurement
        };
        if *current == interval {
            return;
        }
        info!(
            kind = if heartbeat { "heartbeat" } else { "measurement" },
            from = current.as_secs(),
            to = interval.as_secs(),
            "Interval changed by collector"
        );
        *current = interval;
        drop(intervals);

        let subscribers = self.subscribers.lock_or_panic();
        let sinks = if heartbeat {
            &subscribers.heartbeat
        } else {
            &subscribers.measurement
        };
        for tx in sinks {
            // Non blocking write, to avoid a dead lock situation.
            if tx.try_send(interval).is_err() {
                warn!(
                    interval = interval.as_secs(),
                    "Interval change could not be sent to a channel"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::MockServer;
    use serde_json::json;
    use ves_event::HeartbeatEvent;

    fn collector_for(server: &MockServer) -> Collector {
        let config = CollectorConfig {
            fqdn: server.host(),
            port: server.port(),
            secure: false,
            topic: "mytopic".to_string(),
            user: "user".to_string(),
            password: "pass".to_string(),
            ..Default::default()
        };
        let event = EventConfig {
            reporting_entity_name: "entity".to_string(),
            ..Default::default()
        };
        Collector::new(&config, &event, None, None).unwrap()
    }

    fn heartbeat() -> Event {
        HeartbeatEvent::new("heartbeat0000000000", "heartbeat_hsxp", "hsxp5001", 5).into()
    }

    #[tokio::test]
    async fn test_post_event_targets_topic_and_defaults_entity() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method("POST")
                    .path("/eventListener/v5/mytopic")
                    .json_body_includes(
                        r#"{"event": {"commonEventHeader": {"reportingEntityName": "entity"}}}"#,
                    );
                then.status(202);
            })
            .await;

        collector_for(&server).post_event(heartbeat()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_post_batch_targets_batch_path() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method("POST").path("/eventListener/v5/eventBatch");
                then.status(202);
            })
            .await;

        let mut batch = Batch::new();
        batch.push(heartbeat());
        collector_for(&server).post_batch(batch).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_no_op() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method("POST");
                then.status(202);
            })
            .await;

        collector_for(&server).post_batch(Batch::new()).await.unwrap();
        assert_eq!(mock.hits_async().await, 0);
    }

    #[tokio::test]
    async fn test_schema_validated_on_success_path() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method("POST");
                then.status(202);
            })
            .await;

        let schema = ves_event::EventSchema::from_value(json!({
            "type": "object",
            "required": ["event"],
            "properties": {"event": {
                "type": "object",
                "required": ["commonEventHeader", "heartbeatFields"],
                "properties": {"commonEventHeader": {
                    "type": "object",
                    "required": ["domain", "eventId", "eventName", "priority",
                                 "reportingEntityName", "sequence", "sourceName",
                                 "startEpochMicrosec", "lastEpochMicrosec", "version"]
                }}
            }}
        }))
        .unwrap();

        let config = CollectorConfig {
            fqdn: server.host(),
            port: server.port(),
            user: "user".to_string(),
            password: "pass".to_string(),
            ..Default::default()
        };
        let event = EventConfig {
            reporting_entity_name: "entity".to_string(),
            ..Default::default()
        };
        let collector = Collector::new(&config, &event, None, Some(schema)).unwrap();

        // The composed heartbeat round-trips the validator without errors.
        collector.post_event(heartbeat()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_interval_change_command_notifies_subscribers() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("POST");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(json!({"commandList": [
                        {"commandType": "heartbeatIntervalChange", "heartbeatInterval": 120}
                    ]}));
            })
            .await;

        let collector = collector_for(&server);
        let (tx, mut rx) = mpsc::channel(4);
        collector.notify_heartbeat_interval_changed(tx);

        collector.post_event(heartbeat()).await.unwrap();
        assert_eq!(collector.heartbeat_interval(), Duration::from_secs(120));
        assert_eq!(rx.try_recv().unwrap(), Duration::from_secs(120));

        // The same value again is not a change; nothing is notified.
        collector.post_event(heartbeat()).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_blocked_subscriber_drops_notification() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("POST");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(json!({"commandList": [
                        {"commandType": "measurementIntervalChange", "measurementInterval": 600}
                    ]}));
            })
            .await;

        let collector = collector_for(&server);
        let (full_tx, _full_rx) = mpsc::channel(1);
        full_tx.try_send(Duration::from_secs(1)).unwrap(); // fill it up
        collector.notify_measurement_interval_changed(full_tx);

        // Must not deadlock nor fail the post.
        collector.post_event(heartbeat()).await.unwrap();
        assert_eq!(collector.measurement_interval(), Duration::from_secs(600));
    }
}
