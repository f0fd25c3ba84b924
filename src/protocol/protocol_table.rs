use std::{fmt, rc::Rc};

use tracing::debug;

use super::{surface::CapabilitySurface, Protocol, ProtocolConfig};
use crate::error::{RegistrationError, RegistrationResult, TableKind};

pub type ProtocolFactory = Box<dyn Fn() -> Rc<dyn Protocol>>;

pub struct ProtocolDescriptor {
    name: String,
    factory: ProtocolFactory,
    instance: Option<Rc<dyn Protocol>>,
}

impl ProtocolDescriptor {
    pub fn new<P, F>(config: ProtocolConfig, factory: F) -> Self
    where
        P: Protocol,
        F: Fn() -> P + 'static,
    {
        Self {
            name: config.name,
            factory: Box::new(move || Rc::new(factory()) as Rc<dyn Protocol>),
            instance: None,
        }
    }

    pub fn from_default<P: Protocol + Default>(config: ProtocolConfig) -> Self {
        Self::new(config, P::default)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_instantiated(&self) -> bool {
        self.instance.is_some()
    }

    fn instance_or_create(&mut self) -> Rc<dyn Protocol> {
        if let Some(instance) = &self.instance {
            return instance.clone();
        }
        debug!("Instantiating protocol: {}", self.name);
        let instance = (self.factory)();
        self.instance = Some(instance.clone());
        instance
    }
}

impl fmt::Debug for ProtocolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolDescriptor")
            .field("name", &self.name)
            .field("instantiated", &self.is_instantiated())
            .finish()
    }
}

/// Capability table, kept in registration order.
#[derive(Debug, Default)]
pub struct ProtocolTable {
    protocols: Vec<ProtocolDescriptor>,
}

impl ProtocolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: ProtocolDescriptor) -> RegistrationResult<()> {
        if descriptor.name.trim().is_empty() {
            return Err(RegistrationError::EmptyName {
                table: TableKind::Protocol,
            });
        }
        if self.get(&descriptor.name).is_some() {
            return Err(RegistrationError::DuplicateName {
                table: TableKind::Protocol,
                name: descriptor.name.clone(),
            });
        }
        debug!("Protocol registered: {}", descriptor.name);
        self.protocols.push(descriptor);
        Ok(())
    }

    pub fn register_default<P: Protocol + Default>(
        &mut self,
        config: ProtocolConfig,
    ) -> RegistrationResult<()> {
        self.register(ProtocolDescriptor::from_default::<P>(config))
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        match self.protocols.iter().position(|p| p.name == name) {
            Some(index) => {
                self.protocols.remove(index);
                debug!("Protocol unregistered: {}", name);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&ProtocolDescriptor> {
        self.protocols.iter().find(|p| p.name == name)
    }

    /// The cached instance, once the protocol has been composed.
    pub fn instance(&self, name: &str) -> Option<Rc<dyn Protocol>> {
        self.get(name).and_then(|p| p.instance.clone())
    }

    /// Descriptors in registration order.
    pub fn all(&self) -> Vec<&ProtocolDescriptor> {
        self.protocols.iter().collect()
    }

    pub fn clear(&mut self) {
        self.protocols.clear();
    }

    pub fn len(&self) -> usize {
        self.protocols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }

    /// Instantiates missing protocols and merges every member into one surface.
    ///
    /// Instances are reused across calls, so a second composition is bound to
    /// the same state as the first.
    pub fn compose_all(&mut self) -> CapabilitySurface {
        let mut surface = CapabilitySurface::default();
        for descriptor in self.protocols.iter_mut() {
            let instance = descriptor.instance_or_create();
            for (name, member) in instance.members() {
                surface.merge(name, member);
            }
        }
        debug!(
            "Composed {} members from {} protocols",
            surface.len(),
            self.protocols.len()
        );
        surface
    }
}
