//  Copyright 2020 The monitor-power authors.
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
//! # recorders
//!
//! Uniform counter, duration and gauge primitives on top of heterogeneous
//! metrics backends. A [`MetricsRecorder`] hands out named [`StatObserver`]s and
//! [`StatGauge`]s, [`multi::MultiRecorder`] fans every write out to several
//! recorders at once.
pub mod expvar;
pub mod multi;
pub mod prometheus;
pub mod reducers;

use crate::errors::RecorderError;
use self::expvar::ExpvarRecorder;
use self::prometheus::PrometheusRecorder;
use self::reducers::{CounterObserver, DurationObserver};

#[cfg(test)]
use mockall::automock;

/// Help text used when a metric is created without description.
pub const DEFAULT_HELP: &str = "no description provided";

/// Something that records values of ints, durations or floats.
#[cfg_attr(test, automock)]
pub trait StatGauge {
    /// Replaces the current value.
    fn set(&self, value: f64);
    /// Increments the current value.
    fn add(&self, value: f64);
}

/// Something that observes values of ints, durations or floats.
///
/// There is no read accessor, the effect of an observation is only visible
/// through whatever the observer updates internally.
#[cfg_attr(test, automock)]
pub trait StatObserver {
    fn observe(&self, value: f64);
}

/// Provider of named observers and gauges.
///
/// Every call registers a new series in the underlying backend, a name should
/// therefore be requested once and the returned handle reused.
pub trait MetricsRecorder {
    type Counter: StatObserver;
    type Duration: StatObserver;
    type Gauge: StatGauge;

    /// Returns an observer of occurring events.
    fn counter(&self, name: &str, help: Option<&str>) -> Result<Self::Counter, RecorderError>;
    /// Returns an observer of durations.
    fn duration(&self, name: &str, help: Option<&str>) -> Result<Self::Duration, RecorderError>;
    /// Returns a gauge of floats.
    fn gauge(&self, name: &str, help: Option<&str>) -> Result<Self::Gauge, RecorderError>;
}

pub(crate) fn help_or_default(help: Option<&str>) -> &str {
    help.unwrap_or(DEFAULT_HELP)
}

/// The recorder backends the daemon knows about.
///
/// Static dispatch over the concrete recorders, so that a
/// [`multi::MultiRecorder<Backend>`] can mix them.
#[derive(Debug, Clone)]
pub enum Backend {
    Expvar(ExpvarRecorder),
    Prometheus(PrometheusRecorder),
}

/// Observer handed out by a [`Backend`].
pub enum BackendObserver {
    ExpvarCounter(CounterObserver<expvar::Float>),
    ExpvarDuration(DurationObserver<expvar::Int>),
    Prometheus(::prometheus::Histogram),
}

/// Gauge handed out by a [`Backend`].
#[derive(Clone)]
pub enum BackendGauge {
    Expvar(expvar::Float),
    Prometheus(::prometheus::Gauge),
}

impl StatObserver for BackendObserver {
    fn observe(&self, value: f64) {
        match self {
            BackendObserver::ExpvarCounter(o) => o.observe(value),
            BackendObserver::ExpvarDuration(o) => o.observe(value),
            BackendObserver::Prometheus(o) => StatObserver::observe(o, value),
        }
    }
}

impl StatGauge for BackendGauge {
    fn set(&self, value: f64) {
        match self {
            BackendGauge::Expvar(g) => StatGauge::set(g, value),
            BackendGauge::Prometheus(g) => StatGauge::set(g, value),
        }
    }

    fn add(&self, value: f64) {
        match self {
            BackendGauge::Expvar(g) => StatGauge::add(g, value),
            BackendGauge::Prometheus(g) => StatGauge::add(g, value),
        }
    }
}

impl MetricsRecorder for Backend {
    type Counter = BackendObserver;
    type Duration = BackendObserver;
    type Gauge = BackendGauge;

    fn counter(&self, name: &str, help: Option<&str>) -> Result<BackendObserver, RecorderError> {
        Ok(match self {
            Backend::Expvar(r) => BackendObserver::ExpvarCounter(r.counter(name, help)?),
            Backend::Prometheus(r) => BackendObserver::Prometheus(r.counter(name, help)?),
        })
    }

    fn duration(&self, name: &str, help: Option<&str>) -> Result<BackendObserver, RecorderError> {
        Ok(match self {
            Backend::Expvar(r) => BackendObserver::ExpvarDuration(r.duration(name, help)?),
            Backend::Prometheus(r) => BackendObserver::Prometheus(r.duration(name, help)?),
        })
    }

    fn gauge(&self, name: &str, help: Option<&str>) -> Result<BackendGauge, RecorderError> {
        Ok(match self {
            Backend::Expvar(r) => BackendGauge::Expvar(r.gauge(name, help)?),
            Backend::Prometheus(r) => BackendGauge::Prometheus(r.gauge(name, help)?),
        })
    }
}
