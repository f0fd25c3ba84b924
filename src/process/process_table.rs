use tracing::debug;

use super::{Process, ProcessConfig, ProcessDescriptor};
use crate::error::{RegistrationError, RegistrationResult, TableKind};

/// Process table, stored in registration order.
#[derive(Debug, Default)]
pub struct ProcessTable {
    processes: Vec<ProcessDescriptor>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: ProcessDescriptor) -> RegistrationResult<()> {
        if descriptor.name().trim().is_empty() {
            return Err(RegistrationError::EmptyName {
                table: TableKind::Process,
            });
        }
        if self.get(descriptor.name()).is_some() {
            return Err(RegistrationError::DuplicateName {
                table: TableKind::Process,
                name: descriptor.name().to_string(),
            });
        }
        debug!(
            "Process registered: {} (priority {}, {})",
            descriptor.name(),
            descriptor.priority(),
            descriptor.lifecycle()
        );
        self.processes.push(descriptor);
        Ok(())
    }

    pub fn register_default<P: Process + Default + 'static>(
        &mut self,
        config: ProcessConfig,
    ) -> RegistrationResult<()> {
        self.register(ProcessDescriptor::from_default::<P>(config))
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        match self.processes.iter().position(|p| p.name() == name) {
            Some(index) => {
                self.processes.remove(index);
                debug!("Process unregistered: {}", name);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&ProcessDescriptor> {
        self.processes.iter().find(|p| p.name() == name)
    }

    /// Highest priority first; ties keep registration order.
    pub fn all_sorted_by_priority(&self) -> Vec<&ProcessDescriptor> {
        let mut sorted: Vec<&ProcessDescriptor> = self.processes.iter().collect();
        // sort_by is stable
        sorted.sort_by(|a, b| b.priority().cmp(&a.priority()));
        sorted
    }

    pub fn clear(&mut self) {
        self.processes.clear();
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}
