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
//! # exporters
//!
//! Exposition of what the recorders hold. An exporter doesn't collect
//! anything, it only renders the registries the collector writes to.
pub mod http;

use crate::recorders::expvar::VarTree;
use clap::crate_version;
use prometheus::{Encoder, Registry, TextEncoder};

/// Everything exposed to the outside world: the Prometheus registry and the
/// expvar variable tree.
///
/// Cloning gives other handles on the same registries.
#[derive(Clone)]
pub struct Exposition {
    registry: Registry,
    vars: VarTree,
}

impl Exposition {
    pub fn new(registry: Registry, vars: VarTree) -> Exposition {
        Exposition { registry, vars }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn vars(&self) -> &VarTree {
        &self.vars
    }

    /// Renders the registry in the Prometheus text format.
    pub fn metrics_text(&self) -> Result<Vec<u8>, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }

    /// Renders the variable tree as a JSON object.
    pub fn vars_json(&self) -> String {
        self.vars.to_json().to_string()
    }
}

/// Returns monitor-power version.
pub fn get_monitor_power_version() -> &'static str {
    crate_version!()
}

/// Returns the hostname of the system running monitor-power.
pub fn get_hostname() -> String {
    match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(err) => {
            warn!("Couldn't read the system hostname: {}", err);
            String::from("unknown")
        }
    }
}
