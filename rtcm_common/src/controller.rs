//! Controller trait, loader trait and error types.
//!
//! This module defines:
//! - `Controller` trait - the capability set every control algorithm exposes
//! - `ControllerLoader` trait - source of controller instances by type name
//! - `ControllerError` enum - errors a controller reports to the manager
//! - `InitContext` - what a controller sees during `init_request`
//! - `ControllerSpec` - name, type and parameters of a configured controller

use crate::hardware::{HardwareInterfaces, JointHandle};
use crate::types::{ClaimedResources, InterfaceKind};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors reported by a controller.
///
/// During `init_request` any error is a load failure. During `starting`,
/// `update` or `stopping` any error is fatal for the controller: the manager
/// forces it to `Stopped` and releases its claims.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControllerError {
    /// Required parameter absent from the controller spec.
    #[error("missing parameter '{0}'")]
    MissingParameter(String),

    /// Parameter present but unusable.
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// The hardware does not expose the requested resource.
    #[error("{interface} interface has no resource '{resource}'")]
    UnknownResource {
        interface: InterfaceKind,
        resource: String,
    },

    /// Failure while running.
    #[error("{0}")]
    Fault(String),
}

/// Configured controller: what `load_controller(name)` instantiates.
///
/// # TOML Example
///
/// ```toml
/// [[controllers]]
/// name = "arm_position"
/// type = "JointPositionController"
/// autostart = true
/// [controllers.params]
/// joints = ["joint1", "joint2"]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerSpec {
    /// Unique controller name.
    pub name: String,
    /// Type name resolved through the registered loaders.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Start this controller once the cycle is running.
    #[serde(default)]
    pub autostart: bool,
    /// Controller-specific parameters.
    #[serde(default)]
    pub params: toml::Table,
}

impl ControllerSpec {
    /// Spec without parameters.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            autostart: false,
            params: toml::Table::new(),
        }
    }

    /// Builder-style parameter insert.
    pub fn with_param(mut self, key: &str, value: impl Into<toml::Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }
}

/// What a controller sees during `init_request`.
pub struct InitContext<'a> {
    name: &'a str,
    hardware: &'a HardwareInterfaces,
    params: &'a toml::Table,
}

impl<'a> InitContext<'a> {
    /// Context for controller `name`.
    pub fn new(name: &'a str, hardware: &'a HardwareInterfaces, params: &'a toml::Table) -> Self {
        Self {
            name,
            hardware,
            params,
        }
    }

    /// Name the controller is loaded under.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Full hardware catalogue.
    pub fn hardware(&self) -> &HardwareInterfaces {
        self.hardware
    }

    /// Raw parameter table.
    pub fn params(&self) -> &toml::Table {
        self.params
    }

    /// Obtain a command handle and record the claim.
    ///
    /// Read-only `JointState` handles are returned without a claim.
    ///
    /// # Errors
    /// `ControllerError::UnknownResource` if the hardware does not expose
    /// `resource` through `interface`.
    pub fn claim(
        &self,
        interface: InterfaceKind,
        resource: &str,
        claimed: &mut ClaimedResources,
    ) -> Result<JointHandle, ControllerError> {
        let handle = self
            .hardware
            .get(interface, resource)
            .cloned()
            .ok_or_else(|| ControllerError::UnknownResource {
                interface,
                resource: resource.to_string(),
            })?;
        if interface.is_command() {
            claimed.claim(interface, resource);
        }
        Ok(handle)
    }

    /// Read-only state handle for `resource`.
    pub fn state_handle(&self, resource: &str) -> Result<JointHandle, ControllerError> {
        let mut unused = ClaimedResources::new();
        self.claim(InterfaceKind::JointState, resource, &mut unused)
    }

    /// Optional float parameter; integers are accepted.
    pub fn f64_param(&self, key: &str) -> Result<Option<f64>, ControllerError> {
        self.params
            .get(key)
            .map(|value| as_f64(key, value))
            .transpose()
    }

    /// Optional list of strings.
    pub fn str_list_param(&self, key: &str) -> Result<Option<Vec<String>>, ControllerError> {
        let Some(value) = self.params.get(key) else {
            return Ok(None);
        };
        let items = value.as_array().ok_or_else(|| invalid(key, "expected an array"))?;
        items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| invalid(key, "expected an array of strings"))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    /// Optional list of floats; integers are accepted.
    pub fn f64_list_param(&self, key: &str) -> Result<Option<Vec<f64>>, ControllerError> {
        let Some(value) = self.params.get(key) else {
            return Ok(None);
        };
        let items = value.as_array().ok_or_else(|| invalid(key, "expected an array"))?;
        items
            .iter()
            .map(|item| as_f64(key, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    /// Required list of strings.
    pub fn required_str_list(&self, key: &str) -> Result<Vec<String>, ControllerError> {
        self.str_list_param(key)?
            .ok_or_else(|| ControllerError::MissingParameter(key.to_string()))
    }
}

fn as_f64(key: &str, value: &toml::Value) -> Result<f64, ControllerError> {
    match value {
        toml::Value::Float(f) => Ok(*f),
        toml::Value::Integer(i) => Ok(*i as f64),
        _ => Err(invalid(key, "expected a number")),
    }
}

fn invalid(key: &str, reason: &str) -> ControllerError {
    ControllerError::InvalidParameter {
        name: key.to_string(),
        reason: reason.to_string(),
    }
}

/// Capability set of a control algorithm.
///
/// # Lifecycle
///
/// 1. `init_request()` - once, on the loading thread; declares claims
/// 2. `starting()` - on the periodic thread, when a switch starts it
/// 3. `update()` - every tick while running, before the hardware write
/// 4. `stopping()` - on the periodic thread, when a switch stops it
///
/// `starting`, `update` and `stopping` run inside the hard-deadline cycle:
/// they must not block, sleep or perform I/O.
pub trait Controller: Send {
    /// Acquire handles and declare every claimed resource in `claimed`.
    fn init_request(
        &mut self,
        ctx: &InitContext<'_>,
        claimed: &mut ClaimedResources,
    ) -> Result<(), ControllerError>;

    /// Called once before the first `update` of a run.
    fn starting(&mut self, _now: Instant) -> Result<(), ControllerError> {
        Ok(())
    }

    /// One control step.
    fn update(&mut self, now: Instant, period: Duration) -> Result<(), ControllerError>;

    /// Called once after the last `update` of a run.
    fn stopping(&mut self, _now: Instant) -> Result<(), ControllerError> {
        Ok(())
    }
}

/// Factory function type for creating controller instances.
pub type ControllerFactory = fn() -> Box<dyn Controller>;

/// Source of controller instances.
pub trait ControllerLoader: Send + Sync {
    /// Loader identifier used in logs.
    fn name(&self) -> &str;

    /// Instantiate a controller of `type_name`, or `None` if it cannot.
    fn create_instance(&self, type_name: &str) -> Option<Box<dyn Controller>>;

    /// Type names this loader can instantiate.
    fn declared_classes(&self) -> Vec<String>;
}
