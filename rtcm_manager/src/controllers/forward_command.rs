//! Controllers that forward fixed setpoints to a command interface.
//!
//! Parameters:
//! - `joints` (required): joints to command
//! - `setpoints` (optional): one value per joint
//!
//! Without `setpoints`, the position variant holds the position measured
//! at `starting` and the velocity variant commands zero.

use rtcm_common::controller::{Controller, ControllerError, InitContext};
use rtcm_common::hardware::JointHandle;
use rtcm_common::types::{ClaimedResources, InterfaceKind};
use std::time::{Duration, Instant};

/// Forwards one setpoint per joint through `interface`.
pub struct ForwardCommandController {
    interface: InterfaceKind,
    joints: Vec<JointHandle>,
    setpoints: Option<Vec<f64>>,
    targets: Vec<f64>,
}

impl ForwardCommandController {
    pub fn new(interface: InterfaceKind) -> Self {
        Self {
            interface,
            joints: Vec::new(),
            setpoints: None,
            targets: Vec::new(),
        }
    }

    /// Interface the commands are written through.
    pub fn interface(&self) -> InterfaceKind {
        self.interface
    }

    /// Current per-joint targets.
    pub fn targets(&self) -> &[f64] {
        &self.targets
    }

    fn check_state(&self) -> Result<(), ControllerError> {
        match self.joints.iter().find(|j| !j.position().is_finite()) {
            Some(joint) => Err(ControllerError::Fault(format!(
                "joint '{}' reports a non-finite position",
                joint.name()
            ))),
            None => Ok(()),
        }
    }
}

impl Controller for ForwardCommandController {
    fn init_request(
        &mut self,
        ctx: &InitContext<'_>,
        claimed: &mut ClaimedResources,
    ) -> Result<(), ControllerError> {
        let names = ctx.required_str_list("joints")?;
        if names.is_empty() {
            return Err(ControllerError::InvalidParameter {
                name: "joints".to_string(),
                reason: "must list at least one joint".to_string(),
            });
        }

        let setpoints = ctx.f64_list_param("setpoints")?;
        if let Some(values) = &setpoints {
            if values.len() != names.len() {
                return Err(ControllerError::InvalidParameter {
                    name: "setpoints".to_string(),
                    reason: format!("expected {} values, got {}", names.len(), values.len()),
                });
            }
            if values.iter().any(|v| !v.is_finite()) {
                return Err(ControllerError::InvalidParameter {
                    name: "setpoints".to_string(),
                    reason: "values must be finite".to_string(),
                });
            }
        }

        self.joints = names
            .iter()
            .map(|name| ctx.claim(self.interface, name, claimed))
            .collect::<Result<_, _>>()?;
        self.targets = vec![0.0; self.joints.len()];
        self.setpoints = setpoints;
        Ok(())
    }

    fn starting(&mut self, _now: Instant) -> Result<(), ControllerError> {
        self.check_state()?;
        match (&self.setpoints, self.interface) {
            (Some(values), _) => self.targets.copy_from_slice(values),
            (None, InterfaceKind::Position) => {
                for (target, joint) in self.targets.iter_mut().zip(&self.joints) {
                    *target = joint.position();
                }
            }
            (None, _) => self.targets.fill(0.0),
        }
        Ok(())
    }

    fn update(&mut self, _now: Instant, _period: Duration) -> Result<(), ControllerError> {
        self.check_state()?;
        for (joint, target) in self.joints.iter().zip(&self.targets) {
            joint.set_command(*target);
        }
        Ok(())
    }

    fn stopping(&mut self, _now: Instant) -> Result<(), ControllerError> {
        for joint in &self.joints {
            match self.interface {
                InterfaceKind::Position => joint.set_command(joint.position()),
                _ => joint.set_command(0.0),
            }
        }
        Ok(())
    }
}

/// `JointPositionController`: claims `Position` on every listed joint.
pub struct JointPositionController;

impl JointPositionController {
    pub const TYPE_NAME: &'static str = "JointPositionController";

    pub fn create() -> Box<dyn Controller> {
        Box::new(ForwardCommandController::new(InterfaceKind::Position))
    }
}

/// `JointVelocityController`: claims `Velocity` on every listed joint.
pub struct JointVelocityController;

impl JointVelocityController {
    pub const TYPE_NAME: &'static str = "JointVelocityController";

    pub fn create() -> Box<dyn Controller> {
        Box::new(ForwardCommandController::new(InterfaceKind::Velocity))
    }
}
