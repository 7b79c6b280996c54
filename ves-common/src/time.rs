// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Epoch timestamp helpers and interval arithmetic.
//!
//! Scheduler boundaries are whole multiples of the run interval counted
//! from the unix epoch, so rounding and truncation operate on epoch
//! seconds.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Microseconds elapsed since the unix epoch.
pub fn epoch_micros() -> i64 {
    epoch_micros_at(SystemTime::now())
}

pub fn epoch_micros_at(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_micros() as i64,
        Err(e) => -(e.duration().as_micros() as i64),
    }
}

/// Seconds elapsed since the unix epoch.
pub fn epoch_secs(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}

pub fn from_epoch_secs(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}

/// Round `t` to the nearest multiple of `interval` since the epoch,
/// halfway values rounding up. A zero interval returns `t` unchanged.
pub fn round_to(t: SystemTime, interval: Duration) -> SystemTime {
    let step = interval.as_secs();
    if step == 0 {
        return t;
    }
    let secs = epoch_secs(t);
    let rem = secs.rem_euclid(step as i64);
    let down = secs - rem;
    if (rem as u64) * 2 >= step {
        from_epoch_secs(down + step as i64)
    } else {
        from_epoch_secs(down)
    }
}

/// Truncate `t` down to a multiple of `interval` since the epoch.
/// A zero interval returns `t` unchanged.
pub fn truncate_to(t: SystemTime, interval: Duration) -> SystemTime {
    let step = interval.as_secs();
    if step == 0 {
        return t;
    }
    let secs = epoch_secs(t);
    from_epoch_secs(secs - secs.rem_euclid(step as i64))
}
