// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Periodic trigger with a durable next-run boundary.
//!
//! The scheduler never advances on its own: a run is produced by `step`,
//! and only `ack` (called after the run's output reached the collector)
//! moves the persistent boundary forward. A leader that crashes between
//! the two re-emits the interval on the next node instead of skipping it.

use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use ves_common::time::{round_to, truncate_to};
use ves_state::{StateError, StateStore};

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// It is not time to run yet.
    #[error("scheduler not ready")]
    NotReady,
    #[error(transparent)]
    State(#[from] StateError),
    #[error("job failed: {0}")]
    Job(anyhow::Error),
}

/// A schedulable task, given the time range it covers and the current
/// run interval.
pub trait Job {
    type Output;

    fn run(
        &mut self,
        from: SystemTime,
        to: SystemTime,
        interval: Duration,
    ) -> impl std::future::Future<Output = anyhow::Result<Self::Output>> + Send;
}

/// Schedules a job on a periodic interval, with `(interval, next run)`
/// persisted through the replicated state.
///
/// Not safe for concurrent use; the agent loop owns it exclusively.
pub struct Scheduler<J> {
    name: &'static str,
    default_interval: Duration,
    job: J,
    /// Time of the last successful, unacknowledged run.
    last_time: Option<SystemTime>,
    state: StateStore,
}

impl<J: Job> Scheduler<J> {
    pub fn new(name: &'static str, job: J, default_interval: Duration, state: StateStore) -> Self {
        info!(
            scheduler = name,
            default_interval = default_interval.as_secs(),
            "Creating scheduler"
        );
        Scheduler {
            name,
            default_interval,
            job,
            last_time: None,
            state,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The configured interval, or the default one when unset.
    pub fn interval(&self) -> Duration {
        let interval = self.state.interval(self.name);
        if interval > Duration::ZERO {
            interval
        } else {
            self.default_interval
        }
    }

    /// Change the interval, recomputing the next-run boundary. A boundary
    /// still in the future snaps to `now` rounded to the new interval; an
    /// elapsed boundary is rounded in place. Both fields persist in one
    /// command.
    pub fn set_interval(&mut self, interval: Duration) -> Result<(), StateError> {
        if interval == self.interval() {
            return Ok(());
        }
        let new_interval = if interval > Duration::ZERO {
            interval
        } else {
            self.default_interval
        };

        let now = SystemTime::now();
        let next = self.next_run();
        let next = if next > now {
            round_to(now, new_interval)
        } else {
            round_to(next, new_interval)
        };
        self.state.update_scheduler(self.name, new_interval, next)?;
        info!(
            scheduler = self.name,
            interval = new_interval.as_secs(),
            "Interval updated"
        );
        Ok(())
    }

    /// The time of the next run. On first read the boundary is initialised
    /// to `now` rounded to the default interval; a persistence failure at
    /// that point is only warned about.
    pub fn next_run(&self) -> SystemTime {
        if let Some(next) = self.state.next_run(self.name) {
            return next;
        }
        let next = round_to(SystemTime::now(), self.default_interval);
        if let Err(e) = self.state.update_next_run(self.name, next) {
            warn!(scheduler = self.name, error = %e, "Cannot persist next run time");
        }
        info!(
            scheduler = self.name,
            next = ves_common::time::epoch_secs(next),
            "Next run initialised"
        );
        next
    }

    /// True when the next run boundary has been reached.
    pub fn ready(&self) -> bool {
        self.next_run() <= SystemTime::now()
    }

    /// Time left until the next run; zero when already ready.
    pub fn wait_duration(&self) -> Duration {
        let wait = self
            .next_run()
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO);
        if !wait.is_zero() {
            debug!(scheduler = self.name, wait = wait.as_secs(), "Waiting");
        }
        wait
    }

    /// Execute the next round, covering `[next_run, now]`. The boundary is
    /// not advanced: the caller acknowledges once the output has been
    /// delivered.
    pub async fn step(&mut self) -> Result<J::Output, SchedulerError> {
        self.last_time = None;
        if !self.ready() {
            return Err(SchedulerError::NotReady);
        }
        let now = SystemTime::now();
        let output = self
            .job
            .run(self.next_run(), now, self.interval())
            .await
            .map_err(SchedulerError::Job)?;
        self.last_time = Some(now);
        Ok(output)
    }

    /// Acknowledge the last successful run, advancing the boundary to the
    /// interval following it. Does nothing when there is nothing to
    /// acknowledge.
    pub fn ack(&mut self) -> Result<(), StateError> {
        let Some(last) = self.last_time else {
            return Ok(());
        };
        let interval = self.interval();
        let next = truncate_to(last, interval) + interval;
        debug!(
            scheduler = self.name,
            next = ves_common::time::epoch_secs(next),
            "Acknowledged, advancing next run"
        );
        self.state.update_next_run(self.name, next)?;
        self.last_time = None;
        Ok(())
    }
}
