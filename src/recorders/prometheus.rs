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
//! # prometheus
//!
//! Recorder registering its series into a [Prometheus](https://prometheus.io/)
//! registry, scraped through the `/metrics` endpoint.
use crate::errors::RecorderError;
use crate::recorders::{help_or_default, MetricsRecorder, StatGauge, StatObserver};
use prometheus::{linear_buckets, Gauge, Histogram, HistogramOpts, Opts, Registry};
use std::fmt;

/// Lower bound of the first histogram bucket.
pub const BUCKETS_START: f64 = 20.0;
/// Width of each histogram bucket.
pub const BUCKETS_WIDTH: f64 = 5.0;
/// Number of histogram buckets, +Inf excluded.
pub const BUCKETS_COUNT: usize = 5;

impl StatObserver for Histogram {
    fn observe(&self, value: f64) {
        Histogram::observe(self, value);
    }
}

impl StatGauge for Gauge {
    fn set(&self, value: f64) {
        Gauge::set(self, value);
    }

    fn add(&self, value: f64) {
        Gauge::add(self, value);
    }
}

/// Recorder creating one series per call in a [`Registry`].
///
/// Counters and durations both become histograms, the registry accumulates
/// the observations and the scraper computes rates. Each name can be
/// registered only once.
#[derive(Clone, Default)]
pub struct PrometheusRecorder {
    registry: Registry,
}

impl fmt::Debug for PrometheusRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrometheusRecorder").finish_non_exhaustive()
    }
}

impl PrometheusRecorder {
    pub fn new(registry: Registry) -> PrometheusRecorder {
        PrometheusRecorder { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn histogram(&self, name: &str, help: Option<&str>) -> Result<Histogram, RecorderError> {
        let fail = |source| RecorderError::from_prometheus(name, source);
        let buckets = linear_buckets(BUCKETS_START, BUCKETS_WIDTH, BUCKETS_COUNT).map_err(fail)?;
        let opts = HistogramOpts::new(name, help_or_default(help)).buckets(buckets);
        let histogram = Histogram::with_opts(opts).map_err(fail)?;
        self.registry
            .register(Box::new(histogram.clone()))
            .map_err(fail)?;
        Ok(histogram)
    }
}

impl MetricsRecorder for PrometheusRecorder {
    type Counter = Histogram;
    type Duration = Histogram;
    type Gauge = Gauge;

    fn counter(&self, name: &str, help: Option<&str>) -> Result<Histogram, RecorderError> {
        self.histogram(name, help)
    }

    fn duration(&self, name: &str, help: Option<&str>) -> Result<Histogram, RecorderError> {
        self.histogram(name, help)
    }

    fn gauge(&self, name: &str, help: Option<&str>) -> Result<Gauge, RecorderError> {
        let fail = |source| RecorderError::from_prometheus(name, source);
        let gauge = Gauge::with_opts(Opts::new(name, help_or_default(help))).map_err(fail)?;
        self.registry.register(Box::new(gauge.clone())).map_err(fail)?;
        Ok(gauge)
    }
}
