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
use crate::errors::RecorderError;
use crate::recorders::{MetricsRecorder, StatGauge, StatObserver};
use std::collections::BTreeMap;

/// Composite observer forwarding each observation to every child.
#[derive(Debug)]
pub struct MultiObserver<O>(Vec<O>);

/// Composite gauge forwarding each write to every child.
#[derive(Debug, Clone)]
pub struct MultiGauge<G>(Vec<G>);

impl<O> MultiObserver<O> {
    pub fn children(&self) -> &[O] {
        &self.0
    }
}

impl<G> MultiGauge<G> {
    pub fn children(&self) -> &[G] {
        &self.0
    }
}

impl<O: StatObserver> StatObserver for MultiObserver<O> {
    fn observe(&self, value: f64) {
        for observer in &self.0 {
            observer.observe(value);
        }
    }
}

impl<G: StatGauge> StatGauge for MultiGauge<G> {
    fn set(&self, value: f64) {
        for gauge in &self.0 {
            gauge.set(value);
        }
    }

    fn add(&self, value: f64) {
        for gauge in &self.0 {
            gauge.add(value);
        }
    }
}

/// MetricsRecorder writing to several backends at once.
///
/// Backends are keyed by a label and visited in label order. A failure in any
/// of them fails the whole call, nothing is isolated.
#[derive(Debug, Clone)]
pub struct MultiRecorder<R> {
    backends: BTreeMap<String, R>,
}

impl<R> Default for MultiRecorder<R> {
    fn default() -> Self {
        MultiRecorder {
            backends: BTreeMap::new(),
        }
    }
}

impl<R> MultiRecorder<R> {
    pub fn new() -> MultiRecorder<R> {
        MultiRecorder::default()
    }

    /// Adds `recorder` under `label`, replacing any previous one.
    pub fn with_backend(mut self, label: &str, recorder: R) -> MultiRecorder<R> {
        self.backends.insert(String::from(label), recorder);
        self
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }
}

impl<R> FromIterator<(String, R)> for MultiRecorder<R> {
    fn from_iter<I: IntoIterator<Item = (String, R)>>(iter: I) -> Self {
        MultiRecorder {
            backends: iter.into_iter().collect(),
        }
    }
}

impl<R: MetricsRecorder> MetricsRecorder for MultiRecorder<R> {
    type Counter = MultiObserver<R::Counter>;
    type Duration = MultiObserver<R::Duration>;
    type Gauge = MultiGauge<R::Gauge>;

    fn counter(&self, name: &str, help: Option<&str>) -> Result<Self::Counter, RecorderError> {
        self.backends
            .values()
            .map(|r| r.counter(name, help))
            .collect::<Result<_, _>>()
            .map(MultiObserver)
    }

    fn duration(&self, name: &str, help: Option<&str>) -> Result<Self::Duration, RecorderError> {
        self.backends
            .values()
            .map(|r| r.duration(name, help))
            .collect::<Result<_, _>>()
            .map(MultiObserver)
    }

    fn gauge(&self, name: &str, help: Option<&str>) -> Result<Self::Gauge, RecorderError> {
        self.backends
            .values()
            .map(|r| r.gauge(name, help))
            .collect::<Result<_, _>>()
            .map(MultiGauge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorders::expvar::{ExpvarRecorder, VarTree};
    use crate::recorders::prometheus::PrometheusRecorder;
    use crate::recorders::{Backend, MockStatGauge, MockStatObserver};
    use mockall::predicate::eq;
    use std::time::Duration;

    /// Backend handing out mocks that expect exactly one write of `expected`.
    struct MockBackend {
        expected: f64,
        refuse: bool,
    }

    impl MockBackend {
        fn expecting(expected: f64) -> MockBackend {
            MockBackend {
                expected,
                refuse: false,
            }
        }

        fn refusing() -> MockBackend {
            MockBackend {
                expected: 0.0,
                refuse: true,
            }
        }

        fn check(&self, name: &str) -> Result<(), RecorderError> {
            if self.refuse {
                return Err(RecorderError::DuplicateRegistration {
                    name: String::from(name),
                });
            }
            Ok(())
        }
    }

    impl MetricsRecorder for MockBackend {
        type Counter = MockStatObserver;
        type Duration = MockStatObserver;
        type Gauge = MockStatGauge;

        fn counter(&self, name: &str, _help: Option<&str>) -> Result<MockStatObserver, RecorderError> {
            self.check(name)?;
            let mut observer = MockStatObserver::new();
            observer
                .expect_observe()
                .with(eq(self.expected))
                .times(1)
                .return_const(());
            Ok(observer)
        }

        fn duration(&self, name: &str, help: Option<&str>) -> Result<MockStatObserver, RecorderError> {
            self.counter(name, help)
        }

        fn gauge(&self, name: &str, _help: Option<&str>) -> Result<MockStatGauge, RecorderError> {
            self.check(name)?;
            let mut gauge = MockStatGauge::new();
            gauge
                .expect_set()
                .with(eq(self.expected))
                .times(1)
                .return_const(());
            gauge.expect_add().times(0);
            Ok(gauge)
        }
    }

    #[test]
    fn gauge_set_reaches_every_backend_once() {
        let recorder = MultiRecorder::new()
            .with_backend("expvar", MockBackend::expecting(2.1))
            .with_backend("prometheus", MockBackend::expecting(2.1));
        let gauge = recorder.gauge("watts_now", None).unwrap();
        assert_eq!(gauge.children().len(), 2);
        gauge.set(2.1);
    }

    #[test]
    fn observations_reach_every_backend_once() {
        let recorder: MultiRecorder<MockBackend> = vec![
            (String::from("a"), MockBackend::expecting(12.0)),
            (String::from("b"), MockBackend::expecting(12.0)),
            (String::from("c"), MockBackend::expecting(12.0)),
        ]
        .into_iter()
        .collect();
        let duration = recorder.duration("collect_duration", None).unwrap();
        assert_eq!(duration.children().len(), 3);
        duration.observe(12.0);
    }

    #[test]
    fn one_failing_backend_fails_the_call() {
        let recorder = MultiRecorder::new()
            .with_backend("broken", MockBackend::refusing())
            .with_backend("fine", MockBackend::expecting(0.0));
        assert!(matches!(
            recorder.gauge("voltage_now", None),
            Err(RecorderError::DuplicateRegistration { .. })
        ));
    }

    #[test]
    fn empty_recorder_gives_inert_handles() {
        let recorder = MultiRecorder::<MockBackend>::new();
        let counter = recorder.counter("collect_failures", None).unwrap();
        assert!(counter.children().is_empty());
        counter.observe(1.0);
    }

    #[test]
    fn real_backends_share_the_write() {
        let vars = VarTree::new();
        let registry = ::prometheus::Registry::new();
        let recorder = MultiRecorder::new()
            .with_backend(
                "expvar",
                Backend::Expvar(ExpvarRecorder::new(vars.clone(), Duration::from_secs(1))),
            )
            .with_backend(
                "prometheus",
                Backend::Prometheus(PrometheusRecorder::new(registry.clone())),
            );
        assert_eq!(recorder.labels().collect::<Vec<_>>(), vec!["expvar", "prometheus"]);

        let gauge = recorder.gauge("current_now", Some("battery current")).unwrap();
        gauge.set(500000.0);

        assert_eq!(vars.float("current_now"), Some(500000.0));
        let families = registry.gather();
        assert_eq!(families[0].get_name(), "current_now");
        assert_eq!(families[0].get_metric()[0].get_gauge().get_value(), 500000.0);

        // the expvar backend is visited first and already holds the name
        assert!(recorder.gauge("current_now", None).is_err());
    }
}
