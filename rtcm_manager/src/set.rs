//! Controller set: loaded instances keyed by unique name.
//!
//! Iteration follows registration order, which is also the order running
//! controllers are updated in each tick.

use crate::instance::ControllerInstance;
use crate::status::ControllerStatus;

/// Loaded controllers in registration order.
#[derive(Debug, Default)]
pub struct ControllerSet {
    instances: Vec<ControllerInstance>,
}

impl ControllerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an instance; hands it back if the name is taken.
    pub fn insert(&mut self, instance: ControllerInstance) -> Result<(), ControllerInstance> {
        if self.contains(instance.name()) {
            return Err(instance);
        }
        self.instances.push(instance);
        Ok(())
    }

    /// Remove by name, preserving the order of the rest.
    pub fn remove(&mut self, name: &str) -> Option<ControllerInstance> {
        let index = self.position(name)?;
        Some(self.instances.remove(index))
    }

    pub fn get(&self, name: &str) -> Option<&ControllerInstance> {
        self.instances.iter().find(|c| c.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ControllerInstance> {
        self.instances.iter_mut().find(|c| c.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ControllerInstance> {
        self.instances.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ControllerInstance> {
        self.instances.iter_mut()
    }

    /// Names of running controllers, in registration order.
    pub fn running(&self) -> impl Iterator<Item = &str> {
        self.instances
            .iter()
            .filter(|c| c.state().is_running())
            .map(ControllerInstance::name)
    }

    /// Owned snapshot of every instance.
    pub fn snapshot(&self) -> Vec<ControllerStatus> {
        self.instances
            .iter()
            .map(|c| ControllerStatus::new(c.info(), c.state()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.instances.iter().position(|c| c.name() == name)
    }
}
