//! Protocols: shareable capability objects merged into one surface.
//!
//! A protocol is registered once by name, instantiated lazily the first time
//! the table composes, and kept for the life of its table entry. Its members
//! are copied onto a flat [`surface::CapabilitySurface`] that every unit sees
//! through the execution context.
//!
//! ```text
//! ProtocolTable (registration order)
//!  ├── "counter"  -> Counter { count: Cell<i64> }   increment(), read()
//!  └── "logistics"-> Logistics { .. }               route(), version
//!          │
//!          ▼ compose_all()
//! CapabilitySurface { increment, read, route, version }
//! ```
//!
//! Methods stay bound to the instance that produced them, so state a method
//! mutates is visible to every caller on every later cycle.
//!
//! # Merge rule
//!
//! Protocols are merged in registration order. A method always replaces an
//! existing member of the same name, so the last registered method wins. A
//! property is only copied when the name is still free, so the first
//! registered property wins. The two directions are intentionally different.

pub mod protocol_table;
pub mod surface;

use std::{fmt, rc::Rc};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CapabilityResult;

/// A callable member, bound to its protocol instance.
pub type Method = Rc<dyn Fn(&[Value]) -> CapabilityResult<Value>>;

#[derive(Clone)]
pub enum Member {
    Method(Method),
    Property(Value),
}

impl Member {
    pub fn is_callable(&self) -> bool {
        matches!(self, Member::Method(_))
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Member::Method(_) => write!(f, "Method(..)"),
            Member::Property(value) => f.debug_tuple("Property").field(value).finish(),
        }
    }
}

/// Capability contract.
///
/// Implementors keep their state behind `Cell`/`RefCell`; methods only get a
/// shared reference to the instance.
pub trait Protocol: 'static {
    /// Members to expose, in declaration order.
    fn members(self: Rc<Self>) -> Vec<(String, Member)>;
}

/// Builder that binds member closures to one protocol instance.
pub struct Members<T> {
    instance: Rc<T>,
    members: Vec<(String, Member)>,
}

impl<T: 'static> Members<T> {
    pub fn of(instance: Rc<T>) -> Self {
        Self {
            instance,
            members: Vec::new(),
        }
    }

    pub fn method<F>(mut self, name: &str, method: F) -> Self
    where
        F: Fn(&T, &[Value]) -> CapabilityResult<Value> + 'static,
    {
        let instance = self.instance.clone();
        let bound: Method = Rc::new(move |args: &[Value]| method(&instance, args));
        self.members.push((name.to_string(), Member::Method(bound)));
        self
    }

    pub fn property<V: Into<Value>>(mut self, name: &str, value: V) -> Self {
        self.members
            .push((name.to_string(), Member::Property(value.into())));
        self
    }

    pub fn build(self) -> Vec<(String, Member)> {
        self.members
    }
}

/// Registration input for a protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    pub name: String,
}

impl ProtocolConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}
