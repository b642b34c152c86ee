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
//! # reducers
//!
//! Windowed reducers turning a stream of raw observations into a smoothed
//! value written to a [`StatGauge`]. Memory is bounded: the windows are
//! compacted once they grow past a small constant.
use crate::recorders::{StatGauge, StatObserver};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Number of retained durations above which a new window compacts the history.
pub const DURATION_WINDOW_MAX_LEN: usize = 10;

/// Number of per-second counts above which the history is compacted.
pub const COUNTER_WINDOW_MAX_LEN: usize = 20;

/// Number of per-second counts kept by a counter compaction.
pub const COUNTER_COMPACTED_LEN: usize = 2;

/// Length of a counter window.
pub const COUNTER_STEP: Duration = Duration::from_secs(1);

/// Nothing is written to the gauge until more samples than this are retained.
const MIN_SAMPLES: usize = 2;

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

#[derive(Debug)]
struct DurationWindow {
    tick: Instant,
    values: Vec<f64>,
    reduce_interval: Duration,
    integral: bool,
}

impl DurationWindow {
    /// Records `value` and returns the average to publish, if any.
    fn push(&mut self, value: f64, now: Instant) -> Option<f64> {
        if now.saturating_duration_since(self.tick) > self.reduce_interval {
            self.tick = now;
            if self.values.len() > DURATION_WINDOW_MAX_LEN {
                let last = self.values.len() - 1;
                self.values.drain(..last);
            }
        }
        self.values.push(if self.integral { value.trunc() } else { value });
        if self.values.len() <= MIN_SAMPLES {
            return None;
        }
        let average = mean(&self.values);
        Some(if self.integral { average.trunc() } else { average })
    }
}

/// Moving average of duration-like observations.
///
/// A window is considered complete once `reduce_interval` has elapsed. When a
/// new window starts with more than [`DURATION_WINDOW_MAX_LEN`] values retained,
/// everything but the latest value is dropped. The gauge gets the mean of the
/// retained values as soon as more than two of them are available.
///
/// The mean is computed in f64, unless the observer is built with
/// [`DurationObserver::integral`]: samples are then truncated towards zero
/// before being summed, and so is the mean.
#[derive(Debug)]
pub struct DurationObserver<G> {
    gauge: G,
    window: Mutex<DurationWindow>,
}

impl<G: StatGauge> DurationObserver<G> {
    pub fn new(gauge: G, reduce_interval: Duration) -> DurationObserver<G> {
        DurationObserver::starting_at(gauge, reduce_interval, Instant::now(), false)
    }

    /// Observer of whole durations, for integer gauges.
    pub fn integral(gauge: G, reduce_interval: Duration) -> DurationObserver<G> {
        DurationObserver::starting_at(gauge, reduce_interval, Instant::now(), true)
    }

    fn starting_at(
        gauge: G,
        reduce_interval: Duration,
        tick: Instant,
        integral: bool,
    ) -> DurationObserver<G> {
        DurationObserver {
            gauge,
            window: Mutex::new(DurationWindow {
                tick,
                values: vec![],
                reduce_interval,
                integral,
            }),
        }
    }

    fn observe_at(&self, value: f64, now: Instant) {
        // the lock is released before writing to the gauge
        let average = self.window.lock().push(value, now);
        if let Some(average) = average {
            self.gauge.set(average);
        }
    }

    /// Number of values currently retained in the window.
    pub fn retained(&self) -> usize {
        self.window.lock().values.len()
    }
}

impl<G: StatGauge> StatObserver for DurationObserver<G> {
    fn observe(&self, value: f64) {
        self.observe_at(value, Instant::now());
    }
}

/// What a counter observation asks the gauge to do.
#[derive(Debug, PartialEq)]
enum RateUpdate {
    Set(f64),
    Bootstrap,
}

#[derive(Debug)]
struct CounterWindow {
    tick: Instant,
    values: Vec<f64>,
    events: f64,
}

impl CounterWindow {
    fn push(&mut self, value: f64, now: Instant) -> RateUpdate {
        let j = self.values.len();
        if now.saturating_duration_since(self.tick) > COUNTER_STEP {
            self.values.push(self.events);
            self.tick = now;
            self.events = 0.0;
            if j > COUNTER_WINDOW_MAX_LEN {
                let keep_from = self.values.len() - COUNTER_COMPACTED_LEN;
                self.values.drain(..keep_from);
            }
        }
        self.events += value;
        if j > MIN_SAMPLES {
            // divided by the length seen before this observation, the
            // published rate lags one step behind
            RateUpdate::Set(self.values.iter().sum::<f64>() / j as f64)
        } else {
            RateUpdate::Bootstrap
        }
    }
}

/// Approximate per-second rate of the observed events.
///
/// Observed values are accumulated for one second, then pushed as one entry of
/// the history. Until more than two entries exist, every observation adds 1 to
/// the gauge so that something moves; afterwards the gauge is set to the
/// average of the history.
#[derive(Debug)]
pub struct CounterObserver<G> {
    gauge: G,
    window: Mutex<CounterWindow>,
}

impl<G: StatGauge> CounterObserver<G> {
    pub fn new(gauge: G) -> CounterObserver<G> {
        CounterObserver::starting_at(gauge, Instant::now())
    }

    fn starting_at(gauge: G, tick: Instant) -> CounterObserver<G> {
        CounterObserver {
            gauge,
            window: Mutex::new(CounterWindow {
                tick,
                values: vec![],
                events: 0.0,
            }),
        }
    }

    fn observe_at(&self, value: f64, now: Instant) {
        let update = self.window.lock().push(value, now);
        match update {
            RateUpdate::Set(rate) => self.gauge.set(rate),
            RateUpdate::Bootstrap => self.gauge.add(1.0),
        }
    }

    /// Number of per-second counts currently retained.
    pub fn retained(&self) -> usize {
        self.window.lock().values.len()
    }
}

impl<G: StatGauge> StatObserver for CounterObserver<G> {
    fn observe(&self, value: f64) {
        self.observe_at(value, Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorders::MockStatGauge;
    use mockall::predicate::eq;
    use std::sync::Arc;
    use std::thread;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Set(f64),
        Add(f64),
    }

    /// Gauge keeping track of every call it receives.
    #[derive(Debug, Default, Clone)]
    struct RecordingGauge {
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl RecordingGauge {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }
    }

    impl StatGauge for RecordingGauge {
        fn set(&self, value: f64) {
            self.calls.lock().push(Call::Set(value));
        }
        fn add(&self, value: f64) {
            self.calls.lock().push(Call::Add(value));
        }
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn duration_two_observations_never_set() {
        let mut gauge = MockStatGauge::new();
        gauge.expect_set().times(0);
        gauge.expect_add().times(0);
        let t0 = Instant::now();
        let observer = DurationObserver::starting_at(gauge, Duration::from_secs(1), t0, false);
        observer.observe_at(10.0, t0);
        observer.observe_at(20.0, t0 + ms(10));
    }

    #[test]
    fn duration_publishes_mean_of_window() {
        let mut gauge = MockStatGauge::new();
        gauge.expect_set().with(eq(20.0)).times(1).return_const(());
        let t0 = Instant::now();
        let observer = DurationObserver::starting_at(gauge, Duration::from_secs(1), t0, false);
        for v in [10.0, 20.0, 30.0] {
            observer.observe_at(v, t0);
        }
    }

    #[test]
    fn duration_keeps_averaging_the_whole_window() {
        let gauge = RecordingGauge::default();
        let t0 = Instant::now();
        let observer = DurationObserver::starting_at(gauge.clone(), Duration::from_secs(1), t0, false);
        for v in [1.0, 2.0, 3.0, 6.0] {
            observer.observe_at(v, t0 + ms(100));
        }
        assert_eq!(gauge.calls(), vec![Call::Set(2.0), Call::Set(3.0)]);
    }

    #[test]
    fn duration_compacts_history_on_new_window() {
        let gauge = RecordingGauge::default();
        let interval = Duration::from_secs(1);
        let t0 = Instant::now();
        let observer = DurationObserver::starting_at(gauge.clone(), interval, t0, false);
        for i in 0..11 {
            observer.observe_at(i as f64, t0);
        }
        assert_eq!(observer.retained(), 11);

        observer.observe_at(100.0, t0 + interval + ms(1));
        assert_eq!(observer.retained(), 2);
        // two retained values are not enough to publish
        assert_eq!(gauge.calls().last(), Some(&Call::Set(5.0)));

        observer.observe_at(20.0, t0 + interval + ms(2));
        assert_eq!(observer.retained(), 3);
        assert_eq!(gauge.calls().last(), Some(&Call::Set((10.0 + 100.0 + 20.0) / 3.0)));
    }

    #[test]
    fn duration_small_window_survives_new_interval() {
        let gauge = RecordingGauge::default();
        let interval = Duration::from_secs(1);
        let t0 = Instant::now();
        let observer = DurationObserver::starting_at(gauge, interval, t0, false);
        for i in 0..5 {
            observer.observe_at(i as f64, t0);
        }
        observer.observe_at(5.0, t0 + interval * 3);
        assert_eq!(observer.retained(), 6);
    }

    #[test]
    fn integral_durations_truncate_each_sample() {
        let t0 = Instant::now();
        let whole = RecordingGauge::default();
        let observer = DurationObserver::starting_at(whole.clone(), Duration::from_secs(1), t0, true);
        let float = RecordingGauge::default();
        let reference = DurationObserver::starting_at(float.clone(), Duration::from_secs(1), t0, false);
        for v in [0.9, 0.9, 1.5] {
            observer.observe_at(v, t0);
            reference.observe_at(v, t0);
        }
        // 0 + 0 + 1 over 3 samples
        assert_eq!(whole.calls(), vec![Call::Set(0.0)]);
        assert_eq!(float.calls(), vec![Call::Set((0.9 + 0.9 + 1.5) / 3.0)]);

        observer.observe_at(7.9, t0);
        assert_eq!(whole.calls().last(), Some(&Call::Set(2.0)));
    }

    #[test]
    fn counter_bootstraps_with_add() {
        let mut gauge = MockStatGauge::new();
        gauge.expect_add().with(eq(1.0)).times(3).return_const(());
        gauge.expect_set().times(0);
        let t0 = Instant::now();
        let observer = CounterObserver::starting_at(gauge, t0);
        observer.observe_at(1.0, t0 + ms(1100));
        observer.observe_at(2.0, t0 + ms(2200));
        observer.observe_at(3.0, t0 + ms(3300));
    }

    #[test]
    fn counter_rate_lags_one_step() {
        let gauge = RecordingGauge::default();
        let t0 = Instant::now();
        let observer = CounterObserver::starting_at(gauge.clone(), t0);
        observer.observe_at(1.0, t0 + ms(1100));
        observer.observe_at(2.0, t0 + ms(2200));
        observer.observe_at(3.0, t0 + ms(3300));
        // history is [0, 1, 2, 3] but the divisor is still 3
        observer.observe_at(4.0, t0 + ms(4400));
        // same second, nothing pushed, divisor catches up
        observer.observe_at(5.0, t0 + ms(4500));
        assert_eq!(
            gauge.calls(),
            vec![
                Call::Add(1.0),
                Call::Add(1.0),
                Call::Add(1.0),
                Call::Set(2.0),
                Call::Set(1.5),
            ]
        );
    }

    #[test]
    fn counter_accumulates_within_a_second() {
        let gauge = RecordingGauge::default();
        let t0 = Instant::now();
        let observer = CounterObserver::starting_at(gauge.clone(), t0);
        for _ in 0..5 {
            observer.observe_at(1.0, t0 + ms(500));
        }
        assert_eq!(observer.retained(), 0);
        assert_eq!(gauge.calls(), vec![Call::Add(1.0); 5]);
    }

    #[test]
    fn counter_compacts_to_last_two() {
        let gauge = RecordingGauge::default();
        let t0 = Instant::now();
        let observer = CounterObserver::starting_at(gauge.clone(), t0);
        for i in 1..=21 {
            observer.observe_at(1.0, t0 + ms(1100 * i));
        }
        // history is [0, 1, 1, ...], compaction waits for more than 20 entries
        // before the push
        assert_eq!(observer.retained(), 21);
        assert_eq!(gauge.calls().last(), Some(&Call::Set(1.0)));

        observer.observe_at(1.0, t0 + ms(1100 * 22));
        assert_eq!(observer.retained(), COUNTER_COMPACTED_LEN);
        // [1, 1] divided by the 21 entries seen before compaction
        assert_eq!(gauge.calls().last(), Some(&Call::Set(2.0 / 21.0)));

        // two entries before the push, back to bootstrapping
        observer.observe_at(1.0, t0 + ms(1100 * 23));
        assert_eq!(observer.retained(), 3);
        assert_eq!(gauge.calls().last(), Some(&Call::Add(1.0)));
    }

    #[test]
    fn reducers_are_safe_under_concurrent_writers() {
        let gauge = RecordingGauge::default();
        let observer = Arc::new(DurationObserver::new(gauge.clone(), Duration::from_secs(3600)));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let observer = Arc::clone(&observer);
                thread::spawn(move || {
                    for _ in 0..50 {
                        observer.observe(5.0);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(observer.retained(), 200);
        assert_eq!(gauge.calls().last(), Some(&Call::Set(5.0)));
    }
}
