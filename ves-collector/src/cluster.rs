// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::RwLock;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use ves_event::{Batch, Event};

use crate::collector::VesCollector;
use crate::{ClientError, Collector};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ActiveSlot {
    Primary,
    Backup,
}

enum Outgoing {
    Event(Event),
    Batch(Batch),
}

/// Primary + optional backup collector with an active pointer.
///
/// Posts go to the active collector; after `max_missed + 1` consecutive
/// failed attempts the active pointer switches to the alternate collector
/// and the last error is returned. Failover is silent at the data plane:
/// a later post simply targets the other collector.
pub struct CollectorCluster {
    primary: Collector,
    backup: Option<Collector>,
    active: RwLock<ActiveSlot>,
    max_missed: u32,
    retry_interval: Duration,
}

impl CollectorCluster {
    pub fn new(
        primary: Collector,
        backup: Option<Collector>,
        max_missed: u32,
        retry_interval: Duration,
    ) -> Self {
        if backup.is_none() {
            debug!("No backup collector configured");
        }
        CollectorCluster {
            primary,
            backup,
            active: RwLock::new(ActiveSlot::Primary),
            max_missed,
            retry_interval,
        }
    }

    fn active_slot(&self) -> ActiveSlot {
        *self.active.read().unwrap_or_else(|e| e.into_inner())
    }

    fn active(&self) -> &Collector {
        match self.active_slot() {
            ActiveSlot::Primary => &self.primary,
            ActiveSlot::Backup => self.backup.as_ref().unwrap_or(&self.primary),
        }
    }

    pub fn is_primary_active(&self) -> bool {
        self.active_slot() == ActiveSlot::Primary
    }

    /// Move the active pointer to the alternate collector, when there is
    /// one. The active collector is never cleared.
    fn switch_collector(&self) {
        let mut active = self.active.write().unwrap_or_else(|e| e.into_inner());
        match *active {
            ActiveSlot::Primary => {
                if self.backup.is_some() {
                    *active = ActiveSlot::Backup;
                    debug!("Use backup collector");
                } else {
                    debug!("No backup collector, stay on primary");
                }
            }
            ActiveSlot::Backup => {
                *active = ActiveSlot::Primary;
                debug!("Use primary collector");
            }
        }
    }

    async fn attempt(&self, payload: &Outgoing) -> Result<(), ClientError> {
        match payload {
            Outgoing::Event(event) => self.active().post_event(event.clone()).await,
            Outgoing::Batch(batch) => self.active().post_batch(batch.clone()).await,
        }
    }

    async fn perform(&self, what: &str, payload: Outgoing) -> Result<(), ClientError> {
        let mut attempt = 0;
        loop {
            match self.attempt(&payload).await {
                Ok(()) => {
                    debug!("Post {what} successful");
                    return Ok(());
                }
                Err(err) => {
                    error!(error = %err, "Cannot post {what}");
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    if attempt == self.max_missed {
                        error!("VES collector unreachable, switch");
                        self.switch_collector();
                        return Err(err);
                    }
                    attempt += 1;
                    info!(
                        retry_in = self.retry_interval.as_secs(),
                        "Retry post {what}"
                    );
                    tokio::time::sleep(self.retry_interval).await;
                }
            }
        }
    }

    async fn post_batch_inner(&self, batch: Batch) -> Result<(), ClientError> {
        if batch.is_empty() {
            return Ok(());
        }
        match self.perform("batch", Outgoing::Batch(batch.clone())).await {
            Err(ClientError::BodyTooLarge { .. }) => {
                let (left, right) = batch.split();
                if left.is_empty() || right.is_empty() {
                    error!("Cannot split batch more, event is bigger than maximum authorized");
                    return Err(ClientError::EventTooLarge);
                }
                Box::pin(self.post_batch_inner(left)).await?;
                Box::pin(self.post_batch_inner(right)).await
            }
            other => other,
        }
    }
}

impl VesCollector for CollectorCluster {
    /// Send an event through the active collector, retrying and failing
    /// over per the cluster policy.
    async fn post_event(&self, event: Event) -> Result<(), ClientError> {
        match self.perform("event", Outgoing::Event(event)).await {
            Err(ClientError::BodyTooLarge { .. }) => Err(ClientError::EventTooLarge),
            other => other,
        }
    }

    /// Send a batch through the active collector. An over-size batch is
    /// bisected into near-equal halves until every half fits; a half that
    /// cannot shrink further means a single event is over-size, which is
    /// unrecoverable and reported.
    async fn post_batch(&self, batch: Batch) -> Result<(), ClientError> {
        self.post_batch_inner(batch).await
    }

    fn measurement_interval(&self) -> Duration {
        self.active().measurement_interval()
    }

    fn heartbeat_interval(&self) -> Duration {
        self.active().heartbeat_interval()
    }

    /// Register the sink on both primary and backup so a failover keeps
    /// notifications flowing.
    fn notify_measurement_interval_changed(&self, tx: mpsc::Sender<Duration>) {
        self.primary.notify_measurement_interval_changed(tx.clone());
        if let Some(backup) = &self.backup {
            backup.notify_measurement_interval_changed(tx);
        }
    }

    fn notify_heartbeat_interval_changed(&self, tx: mpsc::Sender<Duration>) {
        self.primary.notify_heartbeat_interval_changed(tx.clone());
        if let Some(backup) = &self.backup {
            backup.notify_heartbeat_interval_changed(tx);
        }
    }
}
