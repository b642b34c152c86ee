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
//! Monitor-power is a power usage monitoring agent: it samples the battery
//! figures of the machine and republishes them through expvar and Prometheus
//! at the same time.
#[macro_use]
extern crate log;
pub mod collector;
pub mod config;
pub mod errors;
pub mod exporters;
pub mod recorders;
pub mod sensors;
pub mod service;

use collector::Collector;
use config::Options;
use errors::Error;
use exporters::{get_hostname, Exposition};
use prometheus::Registry;
use recorders::expvar::{ExpvarRecorder, VarTree};
use recorders::multi::MultiRecorder;
use recorders::prometheus::PrometheusRecorder;
use recorders::Backend;
use sensors::Sensor;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Builds the recorder writing both to `vars` and to `registry`.
pub fn build_recorder(
    vars: &VarTree,
    registry: &Registry,
    reduce_interval: Duration,
) -> MultiRecorder<Backend> {
    MultiRecorder::new()
        .with_backend(
            "expvar",
            Backend::Expvar(ExpvarRecorder::new(vars.clone(), reduce_interval)),
        )
        .with_backend(
            "prometheus",
            Backend::Prometheus(PrometheusRecorder::new(registry.clone())),
        )
}

/// The collection loop and the HTTP endpoint, sharing the same registries.
pub struct Daemon {
    address: SocketAddr,
    collect_interval: Duration,
    collector: Collector<MultiRecorder<Backend>>,
    exposition: Exposition,
}

impl Daemon {
    /// Registers every metric of the daemon, reading from `sensor`.
    pub fn new(opts: &Options, sensor: Box<dyn Sensor + Send>) -> Result<Daemon, Error> {
        let address = opts.listen_address()?;
        let vars = VarTree::new();
        let registry = Registry::new();
        let recorder = build_recorder(&vars, &registry, opts.reduce_interval);
        let collector = Collector::new(sensor, &recorder)?;
        Ok(Daemon {
            address,
            collect_interval: opts.collect_interval,
            collector,
            exposition: Exposition::new(registry, vars),
        })
    }

    pub fn exposition(&self) -> &Exposition {
        &self.exposition
    }

    /// Serves and collects until `token` is cancelled or the server fails.
    pub async fn run(self, token: CancellationToken) -> Result<(), Error> {
        let (_, server) = exporters::http::bind(&self.address, self.exposition, token.clone())?;
        let collecting = tokio::spawn(self.collector.run(self.collect_interval, token.clone()));
        let served = server.await;
        token.cancel();
        collecting.await?;
        served?;
        Ok(())
    }
}

/// Cancels `token` on SIGINT or SIGTERM.
fn cancel_on_signal(token: CancellationToken) -> Result<(), Error> {
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    tokio::spawn(async move {
        let received = tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
            _ = token.cancelled() => return,
        };
        info!("Received {}, shutting down.", received);
        token.cancel();
    });
    Ok(())
}

/// Runs the daemon with `opts` until it receives SIGINT or SIGTERM.
#[tokio::main]
pub async fn run(opts: Options) -> Result<(), Error> {
    info!(
        "Starting monitor-power on {} with {:?}",
        get_hostname(),
        opts
    );
    let sensor = sensors::get_sensor(&opts.os)?;
    let daemon = Daemon::new(&opts, sensor)?;
    let token = CancellationToken::new();
    cancel_on_signal(token.clone())?;
    daemon.run(token).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorders::{MetricsRecorder, StatGauge};

    #[test]
    fn recorder_writes_to_both_backends() {
        let vars = VarTree::new();
        let registry = Registry::new();
        let recorder = build_recorder(&vars, &registry, Duration::from_secs(1));
        assert_eq!(recorder.labels().collect::<Vec<_>>(), vec!["expvar", "prometheus"]);

        recorder.gauge("watts_now", None).unwrap().set(2.1);
        assert_eq!(vars.float("watts_now"), Some(2.1));
        assert_eq!(registry.gather()[0].get_metric()[0].get_gauge().get_value(), 2.1);
    }

    #[test]
    fn daemon_refuses_bad_addresses() {
        let opts = Options {
            http: String::from("nowhere"),
            ..Options::default()
        };
        let sensor = Box::new(sensors::power_supply::PowerSupplySensor::new("/nonexistent"));
        assert!(matches!(
            Daemon::new(&opts, sensor),
            Err(Error::Config(errors::ConfigError::ListenAddress(_)))
        ));
    }
}
