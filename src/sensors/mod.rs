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
pub mod power_supply;
pub mod units;

use crate::errors::SensorError;
use std::collections::HashMap;

/// Key of the battery voltage, in µV.
pub const VOLTAGE: &str = "voltage";
/// Key of the battery current, in µA.
pub const CURRENT: &str = "current";
/// Key of the power drawn, in W.
pub const WATTS: &str = "watts";

/// Result of the collection of one metric on the underlying system.
///
/// `value` is the raw text read from the system, the caller parses it.
#[derive(Debug, Default)]
pub struct CollectedMetric {
    pub value: String,
    pub err: Option<SensorError>,
}

impl CollectedMetric {
    pub fn ok(value: impl Into<String>) -> CollectedMetric {
        CollectedMetric {
            value: value.into(),
            err: None,
        }
    }

    pub fn failed(err: SensorError) -> CollectedMetric {
        CollectedMetric {
            value: String::new(),
            err: Some(err),
        }
    }
}

impl From<Result<String, SensorError>> for CollectedMetric {
    fn from(result: Result<String, SensorError>) -> Self {
        match result {
            Ok(value) => CollectedMetric::ok(value),
            Err(err) => CollectedMetric::failed(err),
        }
    }
}

// !!!!!!!!!!!!!!!!! Sensor !!!!!!!!!!!!!!!!!!!!!!!
/// Sensor trait, the Sensor API.
///
/// A sensor fills every key of `dst` it knows about with a fresh reading and
/// leaves the others untouched.
pub trait Sensor {
    fn collect(&self, dst: &mut HashMap<String, CollectedMetric>);
}

/// Names of the OS variants a sensor exists for.
pub const SENSORS: [&str; 1] = ["fedora"];

/// Returns the sensor matching the OS variant `os`.
pub fn get_sensor(os: &str) -> Result<Box<dyn Sensor + Send>, SensorError> {
    match os {
        "fedora" => Ok(Box::new(power_supply::PowerSupplySensor::detect())),
        other => Err(SensorError::UnknownSensor(String::from(other))),
    }
}
