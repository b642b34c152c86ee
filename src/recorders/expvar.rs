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
//! # expvar
//!
//! A tree of named variables exposed by the process, dumped as a single JSON
//! object by the `/debug/vars` endpoint, and the recorder publishing into it.
use crate::errors::RecorderError;
use crate::recorders::reducers::{CounterObserver, DurationObserver};
use crate::recorders::{MetricsRecorder, StatGauge};
use parking_lot::RwLock;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Variable always present in the dump, holding the process arguments.
pub const CMDLINE_VAR: &str = "cmdline";

/// Integer variable.
#[derive(Debug, Clone, Default)]
pub struct Int(Arc<AtomicI64>);

impl Int {
    pub fn value(&self) -> i64 {
        self.0.load(Ordering::Acquire)
    }
}

impl StatGauge for Int {
    /// Stores the value truncated towards zero.
    fn set(&self, value: f64) {
        self.0.store(value as i64, Ordering::Release);
    }

    fn add(&self, value: f64) {
        self.0.fetch_add(value as i64, Ordering::AcqRel);
    }
}

/// Float variable, stored as the bits of an f64.
#[derive(Clone)]
pub struct Float(Arc<AtomicU64>);

impl Default for Float {
    fn default() -> Self {
        Float(Arc::new(AtomicU64::new(0f64.to_bits())))
    }
}

impl fmt::Debug for Float {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Float({})", self.value())
    }
}

impl Float {
    pub fn value(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }
}

impl StatGauge for Float {
    fn set(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Release);
    }

    fn add(&self, value: f64) {
        // the closure never refuses the update, the result is always Ok
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                Some((f64::from_bits(bits) + value).to_bits())
            });
    }
}

#[derive(Debug, Clone)]
enum Var {
    Int(Int),
    Float(Float),
}

impl Var {
    fn to_json(&self) -> Value {
        match self {
            Var::Int(v) => Value::from(v.value()),
            // NaN and infinities have no JSON representation
            Var::Float(v) => Number::from_f64(v.value()).map_or(Value::Null, Value::Number),
        }
    }
}

/// Registry of the process-exposed variables.
///
/// Cloning gives another handle on the same tree.
#[derive(Debug, Clone, Default)]
pub struct VarTree {
    vars: Arc<RwLock<BTreeMap<String, Var>>>,
}

impl VarTree {
    pub fn new() -> VarTree {
        VarTree::default()
    }

    fn publish(&self, name: &str, var: Var) -> Result<(), RecorderError> {
        let mut vars = self.vars.write();
        if name == CMDLINE_VAR || vars.contains_key(name) {
            return Err(RecorderError::DuplicateRegistration {
                name: String::from(name),
            });
        }
        vars.insert(String::from(name), var);
        Ok(())
    }

    /// Publishes a new integer variable named `name`.
    pub fn new_int(&self, name: &str) -> Result<Int, RecorderError> {
        let var = Int::default();
        self.publish(name, Var::Int(var.clone()))?;
        Ok(var)
    }

    /// Publishes a new float variable named `name`.
    pub fn new_float(&self, name: &str) -> Result<Float, RecorderError> {
        let var = Float::default();
        self.publish(name, Var::Float(var.clone()))?;
        Ok(var)
    }

    /// Current value of the float variable `name`.
    pub fn float(&self, name: &str) -> Option<f64> {
        match self.vars.read().get(name) {
            Some(Var::Float(v)) => Some(v.value()),
            _ => None,
        }
    }

    /// Current value of the integer variable `name`.
    pub fn int(&self, name: &str) -> Option<i64> {
        match self.vars.read().get(name) {
            Some(Var::Int(v)) => Some(v.value()),
            _ => None,
        }
    }

    /// Names of the published variables, in lexicographic order.
    pub fn names(&self) -> Vec<String> {
        self.vars.read().keys().cloned().collect()
    }

    /// Dumps every variable, plus the process command line.
    pub fn to_json(&self) -> Value {
        let mut dump = Map::new();
        let cmdline: Vec<Value> = std::env::args_os()
            .map(|arg| Value::from(arg.to_string_lossy().into_owned()))
            .collect();
        dump.insert(String::from(CMDLINE_VAR), Value::Array(cmdline));
        for (name, var) in self.vars.read().iter() {
            dump.insert(name.clone(), var.to_json());
        }
        Value::Object(dump)
    }
}

/// Recorder publishing into a [`VarTree`].
///
/// Gauges are plain float variables. Durations and counters go through the
/// reducers, so that the variable holds a smoothed value instead of the last
/// raw observation.
#[derive(Debug, Clone)]
pub struct ExpvarRecorder {
    vars: VarTree,
    reduce_interval: Duration,
}

impl ExpvarRecorder {
    pub fn new(vars: VarTree, reduce_interval: Duration) -> ExpvarRecorder {
        ExpvarRecorder {
            vars,
            reduce_interval,
        }
    }

    pub fn vars(&self) -> &VarTree {
        &self.vars
    }
}

impl MetricsRecorder for ExpvarRecorder {
    type Counter = CounterObserver<Float>;
    type Duration = DurationObserver<Int>;
    type Gauge = Float;

    fn counter(&self, name: &str, _help: Option<&str>) -> Result<Self::Counter, RecorderError> {
        Ok(CounterObserver::new(self.vars.new_float(name)?))
    }

    fn duration(&self, name: &str, _help: Option<&str>) -> Result<Self::Duration, RecorderError> {
        Ok(DurationObserver::integral(
            self.vars.new_int(name)?,
            self.reduce_interval,
        ))
    }

    fn gauge(&self, name: &str, _help: Option<&str>) -> Result<Self::Gauge, RecorderError> {
        self.vars.new_float(name)
    }
}
