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
//! # collector
//!
//! The collection loop: on every tick, asks the sensor for fresh raw values,
//! parses them and writes them to the gauges obtained from a recorder.
use crate::errors::{CollectError, RecorderError};
use crate::recorders::{MetricsRecorder, StatGauge, StatObserver};
use crate::sensors::{CollectedMetric, Sensor, CURRENT, VOLTAGE, WATTS};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Gauges published by the collector: sensor key, metric name, help.
pub const POWER_GAUGES: [(&str, &str, &str); 3] = [
    (CURRENT, "current_now", "Instant current drawn from the battery, in microamperes."),
    (VOLTAGE, "voltage_now", "Instant voltage of the battery, in microvolts."),
    (WATTS, "watts_now", "Power drawn from the battery, in watts."),
];

/// Name of the observer of the time spent in one collection.
pub const COLLECT_DURATION: &str = "collect_duration_microseconds";
/// Name of the observer of the metrics skipped in one collection.
pub const COLLECT_FAILURES: &str = "collect_failures";

/// Outcome of one parse-and-set pass.
#[derive(Debug, Default)]
pub struct CollectReport {
    /// Number of gauges updated.
    pub set: usize,
    /// Metrics skipped this cycle, with the reason.
    pub skipped: Vec<CollectError>,
}

/// Parses every collected value and sets the matching gauge.
///
/// A metric failing to sample or to parse is logged and skipped for this
/// cycle only, its record is left as is. Consumed records are reset.
pub fn parse_and_set<G: StatGauge>(
    collected: &mut HashMap<String, CollectedMetric>,
    gauges: &HashMap<String, G>,
) -> CollectReport {
    let mut report = CollectReport::default();
    for (name, metric) in collected.iter_mut() {
        let Some(gauge) = gauges.get(name) else {
            continue;
        };
        if let Some(source) = metric.err.take() {
            let error = CollectError::Sampling {
                name: name.clone(),
                source,
            };
            warn!("{}", error);
            report.skipped.push(error);
            continue;
        }
        match metric.value.parse::<f64>() {
            Ok(value) => {
                gauge.set(value);
                *metric = CollectedMetric::default();
                report.set += 1;
            }
            Err(source) => {
                let error = CollectError::Parse {
                    name: name.clone(),
                    source,
                };
                warn!("{}", error);
                report.skipped.push(error);
            }
        }
    }
    report
}

/// Drives a sensor and publishes its readings.
pub struct Collector<R: MetricsRecorder> {
    sensor: Box<dyn Sensor + Send>,
    gauges: HashMap<String, R::Gauge>,
    collected: HashMap<String, CollectedMetric>,
    collect_duration: R::Duration,
    collect_failures: R::Counter,
}

impl<R: MetricsRecorder> Collector<R> {
    /// Registers the power gauges and the self metrics in `recorder`.
    pub fn new(sensor: Box<dyn Sensor + Send>, recorder: &R) -> Result<Collector<R>, RecorderError> {
        let mut gauges = HashMap::new();
        let mut collected = HashMap::new();
        for (key, name, help) in POWER_GAUGES {
            gauges.insert(String::from(key), recorder.gauge(name, Some(help))?);
            collected.insert(String::from(key), CollectedMetric::default());
        }
        Ok(Collector {
            sensor,
            gauges,
            collected,
            collect_duration: recorder.duration(
                COLLECT_DURATION,
                Some("Time spent reading and publishing the power figures, in microseconds."),
            )?,
            collect_failures: recorder.counter(
                COLLECT_FAILURES,
                Some("Metrics skipped during a collection because they couldn't be read or parsed."),
            )?,
        })
    }

    /// Runs one collection.
    pub fn iterate(&mut self) -> CollectReport {
        let started = Instant::now();
        self.sensor.collect(&mut self.collected);
        let report = parse_and_set(&mut self.collected, &self.gauges);
        self.collect_duration
            .observe(started.elapsed().as_micros() as f64);
        self.collect_failures.observe(report.skipped.len() as f64);
        debug!("collected {} metrics", report.set);
        report
    }

    /// Runs [`Collector::iterate`] every `interval` until `token` is cancelled.
    ///
    /// The first collection happens one interval after the start.
    pub async fn run(mut self, interval: Duration, token: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick of a tokio interval completes immediately
        ticker.tick().await;
        info!("Collecting every {:?}", interval);
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Collection loop stopped.");
                    break;
                }
                _ = ticker.tick() => {
                    self.iterate();
                }
            }
        }
    }
}
