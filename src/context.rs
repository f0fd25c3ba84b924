//! Per-cycle execution context and the pieces it is assembled from.
//!
//! A fresh [`ExecutionContext`] is built for every cycle and handed to every
//! unit in that cycle. It borrows the host [`Environment`], the long-lived
//! [`SharedState`], the diagnostics sinks and the composed
//! [`CapabilitySurface`]. Nothing in it is cached between cycles.

use std::{any::Any, rc::Rc};

use mockall::automock;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::{
    diagnostics::{
        metrics::{MetricsSink, NoopMetrics},
        Logger, NoopLogger,
    },
    error::StateError,
    protocol::surface::CapabilitySurface,
};

/// Host-provided compute meter for the current cycle.
#[automock]
pub trait ComputeProbe {
    /// Compute consumed so far in this cycle.
    fn current_usage(&self) -> f64;
    /// Compute granted to this cycle.
    fn limit(&self) -> f64;
    /// Auxiliary reserve the host keeps across cycles.
    fn bucket(&self) -> f64;
}

/// Read-mostly snapshot of the host for one cycle.
///
/// Domain collections are opaque to the scheduler; they ride along as `world`
/// and units downcast them with [`Environment::world`].
#[derive(Clone, Copy)]
pub struct Environment<'a> {
    tick: u64,
    compute: &'a dyn ComputeProbe,
    world: Option<&'a (dyn Any + 'static)>,
}

impl<'a> Environment<'a> {
    pub fn new(tick: u64, compute: &'a dyn ComputeProbe) -> Self {
        Self {
            tick,
            compute,
            world: None,
        }
    }

    pub fn with_world<W: Any>(mut self, world: &'a W) -> Self {
        self.world = Some(world);
        self
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn compute(&self) -> &'a dyn ComputeProbe {
        self.compute
    }

    pub fn world<W: Any>(&self) -> Option<&'a W> {
        self.world.and_then(|world| world.downcast_ref::<W>())
    }
}

/// Mutable state shared by every unit and carried across cycles.
///
/// Units see each other's writes immediately, in execution order. There is no
/// isolation between them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct SharedState {
    values: Map<String, Value>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StateError> {
        match self.values.get(key) {
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|source| StateError::Serde {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns the previous value under `key`, if any.
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> Result<Option<Value>, StateError> {
        let value = serde_json::to_value(value).map_err(|source| StateError::Serde {
            key: key.to_string(),
            source,
        })?;
        Ok(self.values.insert(key.to_string(), value))
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Adds `by` to the integer under `key` (missing counts as 0) and returns the new value.
    pub fn increment(&mut self, key: &str, by: i64) -> Result<i64, StateError> {
        let current: i64 = self.get(key)?.unwrap_or(0);
        let next = current
            .checked_add(by)
            .ok_or_else(|| StateError::Overflow {
                key: key.to_string(),
            })?;
        self.set(key, next)?;
        Ok(next)
    }
}

impl From<Map<String, Value>> for SharedState {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

impl From<SharedState> for Value {
    fn from(state: SharedState) -> Self {
        Value::Object(state.values)
    }
}

/// Everything a unit may touch during one cycle.
pub struct ExecutionContext<'a> {
    env: Environment<'a>,
    shared: &'a mut SharedState,
    logger: &'a dyn Logger,
    metrics: &'a dyn MetricsSink,
    surface: &'a CapabilitySurface,
}

impl<'a> ExecutionContext<'a> {
    pub fn env(&self) -> &Environment<'a> {
        &self.env
    }

    pub fn tick(&self) -> u64 {
        self.env.tick()
    }

    pub fn compute(&self) -> &'a dyn ComputeProbe {
        self.env.compute()
    }

    pub fn shared(&self) -> &SharedState {
        &*self.shared
    }

    pub fn shared_mut(&mut self) -> &mut SharedState {
        &mut *self.shared
    }

    pub fn logger(&self) -> &'a dyn Logger {
        self.logger
    }

    pub fn metrics(&self) -> &'a dyn MetricsSink {
        self.metrics
    }

    pub fn surface(&self) -> &'a CapabilitySurface {
        self.surface
    }
}

/// Builds one [`ExecutionContext`] per cycle from the scheduler's sinks.
#[derive(Clone)]
pub struct ContextAssembler {
    logger: Rc<dyn Logger>,
    metrics: Rc<dyn MetricsSink>,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(Rc::new(NoopLogger), Rc::new(NoopMetrics))
    }
}

impl ContextAssembler {
    pub fn new(logger: Rc<dyn Logger>, metrics: Rc<dyn MetricsSink>) -> Self {
        Self { logger, metrics }
    }

    pub fn with_logger(mut self, logger: Rc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_metrics(mut self, metrics: Rc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn logger(&self) -> &dyn Logger {
        self.logger.as_ref()
    }

    pub fn metrics(&self) -> &dyn MetricsSink {
        self.metrics.as_ref()
    }

    pub fn assemble<'a>(
        &'a self,
        env: &Environment<'a>,
        shared: &'a mut SharedState,
        surface: &'a CapabilitySurface,
    ) -> ExecutionContext<'a> {
        ExecutionContext {
            env: *env,
            shared,
            logger: self.logger.as_ref(),
            metrics: self.metrics.as_ref(),
            surface,
        }
    }
}
