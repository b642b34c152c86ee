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
use std::io;
use std::num::ParseFloatError;
use std::path::PathBuf;

/// Failure while registering a new series in one of the recorder backends.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("metric {name:?} is already registered")]
    DuplicateRegistration { name: String },

    #[error("prometheus registry refused metric {name:?}: {source}")]
    Prometheus {
        name: String,
        #[source]
        source: prometheus::Error,
    },
}

impl RecorderError {
    /// Maps a registry failure for `name`, telling duplicates apart from the rest.
    pub(crate) fn from_prometheus(name: &str, source: prometheus::Error) -> Self {
        match source {
            prometheus::Error::AlreadyReg => RecorderError::DuplicateRegistration {
                name: String::from(name),
            },
            source => RecorderError::Prometheus {
                name: String::from(name),
                source,
            },
        }
    }
}

/// Failure while reading a raw value from the operating system.
#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("couldn't read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("key {0} is missing from the uevent file")]
    MissingKey(&'static str),

    #[error("{key} holds a non numerical value {value:?}")]
    InvalidNumber { key: &'static str, value: String },

    #[error("unknown sensor for os {0:?}")]
    UnknownSensor(String),
}

/// Reason why a metric has been skipped during a collection cycle.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("failed to parse metric {name:?}, err={source}")]
    Parse {
        name: String,
        #[source]
        source: ParseFloatError,
    },

    #[error("failed to sample metric {name:?}, err={source}")]
    Sampling {
        name: String,
        #[source]
        source: SensorError,
    },
}

impl CollectError {
    /// Name of the metric that has been skipped.
    pub fn name(&self) -> &str {
        match self {
            CollectError::Parse { name, .. } => name,
            CollectError::Sampling { name, .. } => name,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid listen address {0:?}")]
    ListenAddress(String),

    #[error("invalid duration {0:?}, expected a number followed by ns, us, ms, s, m or h")]
    Duration(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("service {0} is already installed")]
    AlreadyInstalled(String),

    #[error("service {0} is not installed")]
    NotInstalled(String),

    #[error("service {0} is already running")]
    AlreadyRunning(String),

    #[error("service {0} is not running")]
    NotRunning(String),

    #[error("`systemctl {command}` failed: {stderr}")]
    Systemctl { command: String, stderr: String },

    #[error("service management I/O failure: {0}")]
    Io(#[from] io::Error),
}

/// Top level error returned by the daemon and the service actions.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Recorder(#[from] RecorderError),

    #[error(transparent)]
    Sensor(#[from] SensorError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("http server failure: {0}")]
    Http(#[from] hyper::Error),

    #[error("background task failure: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Io(#[from] io::Error),
}
