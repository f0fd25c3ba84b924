//! Processes: the behavior units the scheduler runs once per cycle.

pub mod process_table;

use std::{cell::RefCell, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{Display, EnumString};

use crate::{
    context::ExecutionContext,
    error::{ProcessResult, RegistrationError, RegistrationResult},
};

/// Unit contract. `run` is the single per-cycle entry point.
///
/// Returning an error (or panicking) only fails this unit; the rest of the
/// cycle still runs.
pub trait Process {
    fn run(&mut self, ctx: &mut ExecutionContext<'_>) -> ProcessResult<()>;
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Lifecycle {
    /// Constructed on first run and reused for the life of the table entry.
    Singleton,
    /// Constructed fresh for every invocation and dropped afterwards.
    #[default]
    PerCycle,
}

/// Registration input for a process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessConfig {
    pub name: String,
    pub priority: i32,
    #[serde(default)]
    pub lifecycle: Lifecycle,
}

impl ProcessConfig {
    pub fn new(name: &str, priority: i32) -> Self {
        Self {
            name: name.to_string(),
            priority,
            lifecycle: Lifecycle::default(),
        }
    }

    pub fn singleton(name: &str, priority: i32) -> Self {
        Self::new(name, priority).with_lifecycle(Lifecycle::Singleton)
    }

    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Validates a raw manifest entry such as
    /// `{"name": "harvest", "priority": 50, "lifecycle": "singleton"}`.
    pub fn from_value(value: &Value) -> RegistrationResult<Self> {
        let object = value.as_object().ok_or_else(|| invalid("entry must be an object"))?;

        let name = match object.get("name") {
            Some(Value::String(name)) => name,
            Some(_) => return Err(invalid("name must be a string")),
            None => return Err(invalid("missing name")),
        };
        if name.trim().is_empty() {
            return Err(RegistrationError::EmptyName {
                table: crate::error::TableKind::Process,
            });
        }

        let priority = object
            .get("priority")
            .ok_or_else(|| invalid(&format!("missing priority for {}", name)))?
            .as_i64()
            .and_then(|p| i32::try_from(p).ok())
            .ok_or_else(|| invalid(&format!("priority for {} must be an integer", name)))?;

        let lifecycle = match object.get("lifecycle") {
            None | Some(Value::Null) => Lifecycle::default(),
            Some(Value::String(raw)) => Lifecycle::from_str(raw)
                .map_err(|_| invalid(&format!("unknown lifecycle for {}: {}", name, raw)))?,
            Some(_) => return Err(invalid("lifecycle must be a string")),
        };

        Ok(Self {
            name: name.clone(),
            priority,
            lifecycle,
        })
    }
}

fn invalid(message: &str) -> RegistrationError {
    RegistrationError::InvalidConfig {
        message: message.to_string(),
    }
}

pub type ProcessFactory = Box<dyn Fn() -> Box<dyn Process>>;

pub struct ProcessDescriptor {
    name: String,
    priority: i32,
    lifecycle: Lifecycle,
    factory: ProcessFactory,
    instance: RefCell<Option<Box<dyn Process>>>,
}

impl ProcessDescriptor {
    pub fn new<P, F>(config: ProcessConfig, factory: F) -> Self
    where
        P: Process + 'static,
        F: Fn() -> P + 'static,
    {
        Self {
            name: config.name,
            priority: config.priority,
            lifecycle: config.lifecycle,
            factory: Box::new(move || Box::new(factory()) as Box<dyn Process>),
            instance: RefCell::new(None),
        }
    }

    pub fn from_default<P: Process + Default + 'static>(config: ProcessConfig) -> Self {
        Self::new(config, P::default)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Only ever true for singletons that have run at least once.
    pub fn is_instantiated(&self) -> bool {
        self.instance.borrow().is_some()
    }

    /// Resolves the instance for one invocation and hands it to `f`.
    ///
    /// Singletons are created on first use and cached on the descriptor;
    /// per-cycle units are created here and dropped when `f` returns.
    pub(crate) fn with_instance<R>(&self, f: impl FnOnce(&mut dyn Process) -> R) -> R {
        match self.lifecycle {
            Lifecycle::Singleton => {
                let mut slot = self.instance.borrow_mut();
                let instance = slot.get_or_insert_with(|| (self.factory)());
                f(&mut **instance)
            }
            Lifecycle::PerCycle => {
                let mut instance = (self.factory)();
                f(&mut *instance)
            }
        }
    }
}

impl fmt::Debug for ProcessDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessDescriptor")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("lifecycle", &self.lifecycle)
            .field("instantiated", &self.is_instantiated())
            .finish()
    }
}
