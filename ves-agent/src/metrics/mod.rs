// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Measurement collection from a metrics backend.

mod collect;
mod prom;
mod set;

pub use collect::{CollectError, MetricsCollector};
pub use prom::{Matrix, MetricsError, MetricsSource, PromClient, QueryRange, Series};
pub use set::{MeasKeys, MeasurementSetBuilder, SetError};
