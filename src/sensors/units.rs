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
use std::fmt;

// !!!!!!!!!!!!!!!!! Unit !!!!!!!!!!!!!!!!!!!!!!!
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Volt,
    MilliVolt,
    MicroVolt,
    Ampere,
    MilliAmpere,
    MicroAmpere,
    KiloWatt,
    Watt,
    MilliWatt,
    MicroWatt,
    NanoWatt,
    PicoWatt,
}

/// Conversion asked between units of different dimensions.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("impossible conversion from {0} to {1}")]
pub struct DimensionMismatch(Unit, Unit);

const VOLTAGE_ORDER: [Unit; 3] = [Unit::Volt, Unit::MilliVolt, Unit::MicroVolt];
const CURRENT_ORDER: [Unit; 3] = [Unit::Ampere, Unit::MilliAmpere, Unit::MicroAmpere];
const POWER_ORDER: [Unit; 6] = [
    Unit::KiloWatt,
    Unit::Watt,
    Unit::MilliWatt,
    Unit::MicroWatt,
    Unit::NanoWatt,
    Unit::PicoWatt,
];

impl Unit {
    /// Converts `measure` from `source_unit` to `dest_unit`.
    ///
    /// Each step in an order is a factor of 1000, the factor being applied at
    /// once so that exact powers of ten stay exact.
    pub fn to(measure: f64, source_unit: &Unit, dest_unit: &Unit) -> Result<f64, DimensionMismatch> {
        for order in [&VOLTAGE_ORDER[..], &CURRENT_ORDER[..], &POWER_ORDER[..]] {
            let pos_source = order.iter().position(|x| x == source_unit);
            let pos_dest = order.iter().position(|x| x == dest_unit);
            if let (Some(pos_source), Some(pos_dest)) = (pos_source, pos_dest) {
                return Ok(Unit::scale(measure, pos_source, pos_dest));
            }
        }
        Err(DimensionMismatch(*source_unit, *dest_unit))
    }

    fn scale(measure: f64, pos_source: usize, pos_dest: usize) -> f64 {
        if pos_dest > pos_source {
            // towards a smaller unit
            measure * 1000f64.powi((pos_dest - pos_source) as i32)
        } else if pos_dest < pos_source {
            measure / 1000f64.powi((pos_source - pos_dest) as i32)
        } else {
            measure
        }
    }

    /// Unit of the product of a current and a voltage.
    fn product(current: &Unit, voltage: &Unit) -> Option<Unit> {
        let pos_current = CURRENT_ORDER.iter().position(|x| x == current)?;
        let pos_voltage = VOLTAGE_ORDER.iter().position(|x| x == voltage)?;
        // Watt is at index 1 in POWER_ORDER
        POWER_ORDER.get(1 + pos_current + pos_voltage).copied()
    }
}

/// Computes power in watts out of a current and a voltage.
///
/// Power supplies report µA and µV, the product is then in pW:
/// `(current * voltage) / 1e12` watts.
pub fn watts(
    current: f64,
    current_unit: &Unit,
    voltage: f64,
    voltage_unit: &Unit,
) -> Result<f64, DimensionMismatch> {
    let unit = Unit::product(current_unit, voltage_unit)
        .ok_or(DimensionMismatch(*current_unit, *voltage_unit))?;
    Unit::to(current * voltage, &unit, &Unit::Watt)
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Volt => write!(f, "Volts"),
            Unit::MilliVolt => write!(f, "MilliVolts"),
            Unit::MicroVolt => write!(f, "MicroVolts"),
            Unit::Ampere => write!(f, "Amperes"),
            Unit::MilliAmpere => write!(f, "MilliAmperes"),
            Unit::MicroAmpere => write!(f, "MicroAmperes"),
            Unit::KiloWatt => write!(f, "KiloWatts"),
            Unit::Watt => write!(f, "Watts"),
            Unit::MilliWatt => write!(f, "MilliWatts"),
            Unit::MicroWatt => write!(f, "MicroWatts"),
            Unit::NanoWatt => write!(f, "NanoWatts"),
            Unit::PicoWatt => write!(f, "PicoWatts"),
        }
    }
}
