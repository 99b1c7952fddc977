//! Registry of controller factories.
//!
//! Provides a `ControllerRegistry` that maps type names to
//! [`ControllerFactory`] functions and serves them to the manager as a
//! [`ControllerLoader`]. Constructed at startup and handed to the manager;
//! no global state.

use crate::controllers::{JointPositionController, JointStateController, JointVelocityController};
use rtcm_common::controller::{Controller, ControllerFactory, ControllerLoader};
use std::collections::HashMap;

/// Type name → factory.
pub struct ControllerRegistry {
    name: String,
    factories: HashMap<&'static str, ControllerFactory>,
}

impl ControllerRegistry {
    /// Create an empty registry.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            factories: HashMap::new(),
        }
    }

    /// Registry holding the controllers shipped with this crate.
    pub fn with_builtin_controllers() -> Self {
        let mut registry = Self::new("builtin");
        registry.register(JointStateController::TYPE_NAME, JointStateController::create);
        registry.register(
            JointPositionController::TYPE_NAME,
            JointPositionController::create,
        );
        registry.register(
            JointVelocityController::TYPE_NAME,
            JointVelocityController::create,
        );
        registry
    }

    /// Register a controller factory.
    ///
    /// # Panics
    /// Panics if a controller type with the same name is already registered.
    pub fn register(&mut self, type_name: &'static str, factory: ControllerFactory) {
        if self.factories.contains_key(type_name) {
            panic!("Controller type '{type_name}' is already registered");
        }
        self.factories.insert(type_name, factory);
    }

    /// Get a factory by type name.
    pub fn get_factory(&self, type_name: &str) -> Option<ControllerFactory> {
        self.factories.get(type_name).copied()
    }

    /// Registered type names, sorted.
    pub fn list_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.factories.keys().copied().collect();
        types.sort_unstable();
        types
    }
}

impl Default for ControllerRegistry {
    fn default() -> Self {
        Self::with_builtin_controllers()
    }
}

impl ControllerLoader for ControllerRegistry {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_instance(&self, type_name: &str) -> Option<Box<dyn Controller>> {
        self.get_factory(type_name).map(|factory| factory())
    }

    fn declared_classes(&self) -> Vec<String> {
        self.list_types().into_iter().map(String::from).collect()
    }
}
