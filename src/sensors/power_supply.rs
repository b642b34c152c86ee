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
//! # PowerSupplySensor
//!
//! Reads battery figures from the Linux power supply class in sysfs.
use crate::errors::SensorError;
use crate::sensors::units::{self, Unit};
use crate::sensors::{CollectedMetric, Sensor, CURRENT, VOLTAGE, WATTS};
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Root of the power supply class.
pub const POWER_SUPPLY_ROOT: &str = "/sys/class/power_supply";

/// Battery read when no other one can be found.
pub const DEFAULT_BATTERY: &str = "BAT0";

const UEVENT_CURRENT: &str = "POWER_SUPPLY_CURRENT_NOW";
const UEVENT_VOLTAGE: &str = "POWER_SUPPLY_VOLTAGE_NOW";

pub struct PowerSupplySensor {
    base_path: PathBuf,
}

impl PowerSupplySensor {
    /// Instantiates a sensor reading the battery directory `base_path`.
    pub fn new(base_path: impl Into<PathBuf>) -> PowerSupplySensor {
        PowerSupplySensor {
            base_path: base_path.into(),
        }
    }

    /// Instantiates a sensor on the first battery found under
    /// [`POWER_SUPPLY_ROOT`], falling back to [`DEFAULT_BATTERY`].
    pub fn detect() -> PowerSupplySensor {
        let root = Path::new(POWER_SUPPLY_ROOT);
        let battery = find_battery(root).unwrap_or_else(|| {
            debug!("No battery found in {}, using {}", POWER_SUPPLY_ROOT, DEFAULT_BATTERY);
            root.join(DEFAULT_BATTERY)
        });
        info!("Reading power supply figures from {}", battery.display());
        PowerSupplySensor::new(battery)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn read(&self, file: &str) -> Result<String, SensorError> {
        let path = self.base_path.join(file);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(String::from(content.trim())),
            Err(source) => Err(SensorError::Io { path, source }),
        }
    }

    /// Instant voltage, in µV.
    pub fn voltage(&self) -> Result<String, SensorError> {
        self.read("voltage_now")
    }

    /// Instant current, in µA.
    pub fn current(&self) -> Result<String, SensorError> {
        self.read("current_now")
    }

    /// Parses the `KEY=VALUE` lines of the uevent file.
    pub fn uevents(&self) -> Result<HashMap<String, String>, SensorError> {
        let content = self.read("uevent")?;
        let mut events = HashMap::new();
        for line in content.lines() {
            match line.trim().split_once('=') {
                Some((key, value)) => {
                    events.insert(String::from(key), String::from(value));
                }
                None => trace!("Skipping uevent line {:?}", line),
            }
        }
        Ok(events)
    }

    /// Power drawn, in W, computed from the uevent current and voltage.
    pub fn watts(&self) -> Result<String, SensorError> {
        let uevents = self.uevents()?;
        let current = uevent_number(&uevents, UEVENT_CURRENT)?;
        let voltage = uevent_number(&uevents, UEVENT_VOLTAGE)?;
        // both factors come from the fixed µA and µV units, the dimensions match
        let watts = units::watts(current, &Unit::MicroAmpere, voltage, &Unit::MicroVolt)
            .unwrap_or(f64::NAN);
        Ok(watts.to_string())
    }
}

fn uevent_number(uevents: &HashMap<String, String>, key: &'static str) -> Result<f64, SensorError> {
    let value = uevents.get(key).ok_or(SensorError::MissingKey(key))?;
    value.parse().map_err(|_| SensorError::InvalidNumber {
        key,
        value: value.clone(),
    })
}

/// Returns the first `BATn` directory of `root`, in lexicographic order.
fn find_battery(root: &Path) -> Option<PathBuf> {
    let re_battery = Regex::new(r"^BAT\d+$").ok()?;
    let mut batteries: Vec<PathBuf> = fs::read_dir(root)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter(|entry| re_battery.is_match(&entry.file_name().to_string_lossy()))
        .map(|entry| entry.path())
        .collect();
    batteries.sort();
    batteries.into_iter().next()
}

impl Sensor for PowerSupplySensor {
    fn collect(&self, dst: &mut HashMap<String, CollectedMetric>) {
        for (name, metric) in dst.iter_mut() {
            let result = match name.as_str() {
                VOLTAGE => self.voltage(),
                CURRENT => self.current(),
                WATTS => self.watts(),
                _ => continue,
            };
            *metric = CollectedMetric::from(result);
        }
    }
}
