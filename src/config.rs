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
//! # config
//!
//! Resolved daemon options and the parsers for their textual forms.
use crate::errors::ConfigError;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

pub const DEFAULT_HTTP: &str = ":9096";
pub const DEFAULT_OS: &str = "fedora";
pub const DEFAULT_COLLECT_INTERVAL: &str = "1s";
pub const DEFAULT_REDUCE_INTERVAL: &str = "1s";

/// Options of the daemon, once resolved from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Listen address of the exposition endpoint.
    pub http: String,
    /// OS variant selecting the sensor.
    pub os: String,
    /// Time between two collections.
    pub collect_interval: Duration,
    /// Reduction interval of the expvar reducers.
    pub reduce_interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            http: String::from(DEFAULT_HTTP),
            os: String::from(DEFAULT_OS),
            collect_interval: Duration::from_secs(1),
            reduce_interval: Duration::from_secs(1),
        }
    }
}

impl Options {
    /// Listen address of the exposition endpoint, see [`parse_listen_address`].
    pub fn listen_address(&self) -> Result<SocketAddr, ConfigError> {
        parse_listen_address(&self.http)
    }
}

/// Parses `host:port`, a bare `:port` meaning every interface.
pub fn parse_listen_address(address: &str) -> Result<SocketAddr, ConfigError> {
    let invalid = || ConfigError::ListenAddress(String::from(address));
    let address = address.trim();
    let full = if address.starts_with(':') {
        format!("0.0.0.0{address}")
    } else {
        String::from(address)
    };
    full.to_socket_addrs()
        .map_err(|_| invalid())?
        .next()
        .ok_or_else(invalid)
}

/// Parses a duration such as `500ms`, `1s` or `2m`.
///
/// Accepted units are `ns`, `us`, `ms`, `s`, `m` and `h`. The number may have
/// a fractional part, negative and zero durations are refused.
pub fn parse_duration(text: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::Duration(String::from(text));
    let text = text.trim();
    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .ok_or_else(invalid)?;
    let (number, unit) = text.split_at(split);
    let number: f64 = number.parse().map_err(|_| invalid())?;
    let nanos_per_unit = match unit {
        "ns" => 1.0,
        "us" | "µs" => 1e3,
        "ms" => 1e6,
        "s" => 1e9,
        "m" => 60e9,
        "h" => 3600e9,
        _ => return Err(invalid()),
    };
    let nanos = (number * nanos_per_unit).round();
    if !(1.0..u64::MAX as f64).contains(&nanos) {
        return Err(invalid());
    }
    Ok(Duration::from_nanos(nanos as u64))
}

/// Renders `duration` in the form [`parse_duration`] reads, with the largest
/// unit dividing it exactly.
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.as_nanos();
    let units: [(&str, u128); 5] = [
        ("h", 3_600_000_000_000),
        ("m", 60_000_000_000),
        ("s", 1_000_000_000),
        ("ms", 1_000_000),
        ("us", 1_000),
    ];
    for (unit, size) in units {
        if nanos >= size && nanos % size == 0 {
            return format!("{}{}", nanos / size, unit);
        }
    }
    format!("{nanos}ns")
}
