// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The agent event loop.
//!
//! A single task multiplexes leadership changes, server-pushed interval
//! changes, inbound alerts and the two scheduler timers. Posting and
//! state commits run inline on this task on purpose: sequence assignment
//! stays causally ordered with the network effect it describes.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{error, info};

use ves_collector::VesCollector;
use ves_event::EventConfig;
use ves_state::StateStore;

use crate::config::AgentConfig;
use crate::convert::{alert_to_fault, FaultManager, StoreOutcome};
use crate::heartbeat::HeartbeatMonitor;
use crate::metrics::{MetricsCollector, MetricsSource};
use crate::rest::AlertMessage;
use crate::scheduler::Scheduler;
use crate::AgentError;

const MEASUREMENTS_SCHEDULER: &str = "measurements";
const HEARTBEATS_SCHEDULER: &str = "heartbeats";

/// Flat delay before retrying a failed scheduler round.
const RETRY_DELAY: Duration = Duration::from_secs(10);

/// Capacity of the notification channels the loop consumes.
const CHANNEL_DEPTH: usize = 1024;

/// The agent: schedulers, fault manager and the channels feeding the loop.
pub struct Agent<S> {
    meas_sched: Scheduler<MetricsCollector<S>>,
    hb_sched: Scheduler<HeartbeatMonitor>,
    meas_deadline: Instant,
    hb_deadline: Instant,
    meas_interval_rx: mpsc::Receiver<Duration>,
    hb_interval_rx: mpsc::Receiver<Duration>,
    alert_rx: mpsc::Receiver<AlertMessage>,
    fault_manager: FaultManager,
    naming_codes: HashMap<String, String>,
    leader_rx: watch::Receiver<bool>,
}

impl<S: MetricsSource + Send> Agent<S> {
    /// Wire the agent: build both schedulers over the replicated state,
    /// subscribe to interval changes on the collector, and keep the alert
    /// channel handed over by the webhook server.
    pub fn new(
        config: &AgentConfig,
        collector: &impl VesCollector,
        metrics_source: S,
        alert_rx: mpsc::Receiver<AlertMessage>,
        state: StateStore,
    ) -> Agent<S> {
        let event: &EventConfig = &config.event;
        let naming_codes = event.naming_codes();

        info!("Create measurement scheduler");
        let meas_collector = MetricsCollector::new(
            &config.measurement,
            event,
            naming_codes.clone(),
            metrics_source,
            state.clone(),
        );
        let meas_sched = Scheduler::new(
            MEASUREMENTS_SCHEDULER,
            meas_collector,
            Duration::from_secs(config.measurement.default_interval_secs),
            state.clone(),
        );

        info!("Create heartbeat scheduler");
        let hb_monitor = HeartbeatMonitor::new(event, naming_codes.clone(), state.clone());
        let hb_sched = Scheduler::new(
            HEARTBEATS_SCHEDULER,
            hb_monitor,
            Duration::from_secs(config.heartbeat.default_interval_secs),
            state.clone(),
        );

        let (meas_interval_tx, meas_interval_rx) = mpsc::channel(CHANNEL_DEPTH);
        collector.notify_measurement_interval_changed(meas_interval_tx);
        let (hb_interval_tx, hb_interval_rx) = mpsc::channel(CHANNEL_DEPTH);
        collector.notify_heartbeat_interval_changed(hb_interval_tx);

        let fault_manager = FaultManager::new(event.clone(), state.clone());
        let leader_rx = state.leader_watch();

        Agent {
            meas_sched,
            hb_sched,
            meas_deadline: Instant::now(),
            hb_deadline: Instant::now(),
            meas_interval_rx,
            hb_interval_rx,
            alert_rx,
            fault_manager,
            naming_codes,
            leader_rx,
        }
    }

    /// Run the loop forever: follow until leadership is gained, lead until
    /// it is lost. Returns only if the leadership stream dies.
    pub async fn run(&mut self, collector: &impl VesCollector) -> anyhow::Result<()> {
        loop {
            info!("Waiting to obtain cluster leadership");
            while !self.follower_step().await? {}
            info!("Gained cluster leadership");

            self.meas_deadline = Instant::now() + self.meas_sched.wait_duration();
            self.hb_deadline = Instant::now() + self.hb_sched.wait_duration();
            while self.leader_step(collector).await? {}
            info!("Lost cluster leadership");
        }
    }

    /// One follower iteration: reject alerts, wait for leadership.
    /// Returns true when this node became leader.
    async fn follower_step(&mut self) -> anyhow::Result<bool> {
        if *self.leader_rx.borrow_and_update() {
            return Ok(true);
        }
        tokio::select! {
            message = self.alert_rx.recv() => {
                let message =
                    message.ok_or_else(|| anyhow::anyhow!("alert channel closed"))?;
                let _ = message.reply.send(Err(AgentError::NotLeader));
                Ok(false)
            }
            changed = self.leader_rx.changed() => {
                changed.map_err(|_| anyhow::anyhow!("leadership stream closed"))?;
                Ok(*self.leader_rx.borrow_and_update())
            }
        }
    }

    /// One leader iteration. Returns false when leadership was lost.
    async fn leader_step(&mut self, collector: &impl VesCollector) -> anyhow::Result<bool> {
        tokio::select! {
            Some(interval) = self.meas_interval_rx.recv() => {
                self.handle_measurement_interval_changed(interval);
                Ok(true)
            }
            Some(interval) = self.hb_interval_rx.recv() => {
                self.handle_heartbeat_interval_changed(interval);
                Ok(true)
            }
            Some(message) = self.alert_rx.recv() => {
                self.handle_alert_received(collector, message).await;
                Ok(true)
            }
            _ = tokio::time::sleep_until(self.meas_deadline) => {
                self.trigger_measurement_event(collector).await;
                Ok(true)
            }
            _ = tokio::time::sleep_until(self.hb_deadline) => {
                self.trigger_heartbeat_event(collector).await;
                Ok(true)
            }
            changed = self.leader_rx.changed() => {
                changed.map_err(|_| anyhow::anyhow!("leadership stream closed"))?;
                Ok(*self.leader_rx.borrow_and_update())
            }
        }
    }

    fn handle_measurement_interval_changed(&mut self, interval: Duration) {
        if let Err(e) = self.meas_sched.set_interval(interval) {
            error!(error = %e, "Cannot update measurement interval");
            return;
        }
        self.meas_deadline = Instant::now() + self.meas_sched.wait_duration();
    }

    fn handle_heartbeat_interval_changed(&mut self, interval: Duration) {
        if let Err(e) = self.hb_sched.set_interval(interval) {
            error!(error = %e, "Cannot update heartbeat interval");
            return;
        }
        self.hb_deadline = Instant::now() + self.hb_sched.wait_duration();
    }

    /// Convert the alert, post it, and only then run its commit. The
    /// caller's reply slot always receives a verdict.
    async fn handle_alert_received(
        &mut self,
        collector: &impl VesCollector,
        message: AlertMessage,
    ) {
        let (outcome, event, commit) =
            alert_to_fault(&message.alert, &self.fault_manager, &self.naming_codes);
        let (Some(event), Some(commit)) = (event, commit) else {
            if outcome == StoreOutcome::InError {
                let _ = message.reply.send(Err(AgentError::Convert));
            } else {
                // Clearing an unknown fault is not the caller's problem.
                let _ = message.reply.send(Ok(()));
            }
            return;
        };

        match collector.post_event(event.into()).await {
            Ok(()) => {
                let committed = commit().map_err(AgentError::from);
                if let Err(e) = &committed {
                    error!(error = %e, "Cannot commit fault state");
                }
                let _ = message.reply.send(committed);
            }
            Err(e) => {
                error!(error = %e, "Cannot post fault");
                let _ = message.reply.send(Err(AgentError::Post(e)));
            }
        }
    }

    async fn trigger_measurement_event(&mut self, collector: &impl VesCollector) {
        let batch = match self.meas_sched.step().await {
            Ok(batch) => batch,
            Err(e) => {
                error!(scheduler = self.meas_sched.name(), error = %e, "Cannot trigger scheduler");
                self.meas_deadline = Instant::now() + RETRY_DELAY;
                return;
            }
        };
        match collector.post_batch(batch).await {
            Ok(()) => {
                if let Err(e) = self.meas_sched.ack() {
                    error!(error = %e, "Cannot acknowledge scheduler execution");
                    self.meas_deadline = Instant::now() + RETRY_DELAY;
                    return;
                }
                self.meas_deadline = Instant::now() + self.meas_sched.wait_duration();
            }
            Err(e) => {
                error!(error = %e, "Cannot post measurements");
                self.meas_deadline = Instant::now() + RETRY_DELAY;
            }
        }
    }

    async fn trigger_heartbeat_event(&mut self, collector: &impl VesCollector) {
        let heartbeat = match self.hb_sched.step().await {
            Ok(heartbeat) => heartbeat,
            Err(e) => {
                error!(scheduler = self.hb_sched.name(), error = %e, "Cannot trigger scheduler");
                self.hb_deadline = Instant::now() + RETRY_DELAY;
                return;
            }
        };
        match collector.post_event(heartbeat.into()).await {
            Ok(()) => {
                if let Err(e) = self.hb_sched.ack() {
                    error!(error = %e, "Cannot acknowledge scheduler execution");
                    self.hb_deadline = Instant::now() + RETRY_DELAY;
                    return;
                }
                self.hb_deadline = Instant::now() + self.hb_sched.wait_duration();
            }
            Err(e) => {
                error!(error = %e, "Cannot post heartbeat");
                self.hb_deadline = Instant::now() + RETRY_DELAY;
            }
        }
    }
}
