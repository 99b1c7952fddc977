//! Simulated robot hardware.
//!
//! Every configured joint is exposed through `JointState` plus each of its
//! supported command modes. The modes share one command cell; which one is
//! interpreted is decided by the last committed switch:
//!
//! - `Position`: first-order lag towards the command (`position_time_constant`,
//!   0 = ideal tracking)
//! - `Velocity`: command integrated into position
//! - `Effort`: command mirrored into the effort reading, joint holds still
//!
//! `prepare_switch` refuses a switch that would have two starters command
//! the same joint, or command a joint through a mode it does not support.
//! A starter may take a joint over from its previous owner: exclusivity
//! between running controllers is the claim registry's job, and an owner
//! forced to stop by a runtime fault never appears in a stop list.

use rtcm_common::hardware::{HardwareInterfaces, JointHandle, RobotHardware};
use rtcm_common::types::{ControllerInfo, InterfaceKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

fn default_modes() -> Vec<InterfaceKind> {
    vec![InterfaceKind::Position, InterfaceKind::Velocity]
}

/// One simulated joint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimJointConfig {
    /// Joint (resource) name.
    pub name: String,
    /// Supported command modes.
    #[serde(default = "default_modes")]
    pub modes: Vec<InterfaceKind>,
    /// Position at startup.
    #[serde(default)]
    pub initial_position: f64,
}

impl SimJointConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            modes: default_modes(),
            initial_position: 0.0,
        }
    }
}

/// `[hardware]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimHardwareConfig {
    #[serde(default)]
    pub joints: Vec<SimJointConfig>,
    /// Position-mode lag time constant [s].
    #[serde(default)]
    pub position_time_constant: f64,
}

struct SimJoint {
    modes: Vec<InterfaceKind>,
    handle: JointHandle,
    /// Active command mode and owning controller.
    owner: Option<(String, InterfaceKind)>,
    /// Command captured by the last `write`.
    latched: f64,
    position: f64,
}

/// Software joint model implementing [`RobotHardware`].
pub struct SimHardware {
    joints: BTreeMap<String, SimJoint>,
    time_constant: f64,
}

impl SimHardware {
    pub fn new(config: &SimHardwareConfig) -> Self {
        let joints = config
            .joints
            .iter()
            .map(|j| {
                let joint = SimJoint {
                    modes: j.modes.iter().copied().filter(|m| m.is_command()).collect(),
                    handle: JointHandle::with_position(&j.name, j.initial_position),
                    owner: None,
                    latched: 0.0,
                    position: j.initial_position,
                };
                (j.name.clone(), joint)
            })
            .collect();
        info!(joints = config.joints.len(), "Simulated hardware created");
        Self {
            joints,
            time_constant: config.position_time_constant.max(0.0),
        }
    }

    /// Active command mode of `joint`.
    pub fn mode(&self, joint: &str) -> Option<InterfaceKind> {
        self.joints
            .get(joint)
            .and_then(|j| j.owner.as_ref())
            .map(|(_, mode)| *mode)
    }

    /// Ownership after a switch, or the first reason it is impossible.
    fn plan_owners(
        &self,
        stop: &[ControllerInfo],
        start: &[ControllerInfo],
    ) -> Result<BTreeMap<String, (String, InterfaceKind)>, String> {
        let mut owners: BTreeMap<String, (String, InterfaceKind)> = self
            .joints
            .iter()
            .filter_map(|(name, j)| j.owner.clone().map(|o| (name.clone(), o)))
            .filter(|(_, (controller, _))| !stop.iter().any(|s| &s.name == controller))
            .collect();

        let mut assigned = BTreeSet::new();
        for starter in start {
            for group in starter.claimed.interfaces() {
                for resource in &group.resources {
                    let Some(joint) = self.joints.get(resource) else {
                        return Err(format!("unknown joint '{resource}'"));
                    };
                    if !joint.modes.contains(&group.interface) {
                        return Err(format!(
                            "joint '{resource}' has no {} mode",
                            group.interface
                        ));
                    }
                    if !assigned.insert(resource.as_str()) {
                        if let Some((other, mode)) = owners.get(resource) {
                            return Err(format!(
                                "joint '{resource}' already commanded by '{other}' through {mode}"
                            ));
                        }
                    }
                    owners.insert(resource.clone(), (starter.name.clone(), group.interface));
                }
            }
        }
        Ok(owners)
    }
}

impl RobotHardware for SimHardware {
    fn name(&self) -> &str {
        "simulation"
    }

    fn interfaces(&self) -> HardwareInterfaces {
        let mut interfaces = HardwareInterfaces::new();
        for joint in self.joints.values() {
            interfaces.register(InterfaceKind::JointState, joint.handle.clone());
            for mode in &joint.modes {
                interfaces.register(*mode, joint.handle.clone());
            }
        }
        interfaces
    }

    fn prepare_switch(&mut self, stop: &[ControllerInfo], start: &[ControllerInfo]) -> bool {
        match self.plan_owners(stop, start) {
            Ok(_) => true,
            Err(reason) => {
                warn!(%reason, "Simulated hardware refused switch");
                false
            }
        }
    }

    fn do_switch(&mut self, stop: &[ControllerInfo], start: &[ControllerInfo]) {
        let Ok(mut owners) = self.plan_owners(stop, start) else {
            return;
        };
        for (name, joint) in &mut self.joints {
            let owner = owners.remove(name);
            if owner.as_ref().map(|o| o.1) != joint.owner.as_ref().map(|o| o.1) {
                debug!(joint = %name, mode = ?owner.as_ref().map(|o| o.1), "Joint mode changed");
                // Hold still until the new owner writes a command.
                joint.latched = match owner {
                    Some((_, InterfaceKind::Position)) => joint.position,
                    _ => 0.0,
                };
            }
            joint.owner = owner;
        }
    }

    fn read(&mut self, _now: Instant, period: Duration) {
        let dt = period.as_secs_f64();
        for joint in self.joints.values_mut() {
            let previous = joint.position;
            let mut effort = 0.0;
            match joint.owner.as_ref().map(|o| o.1) {
                Some(InterfaceKind::Position) => {
                    let alpha = if self.time_constant > 0.0 {
                        dt / (self.time_constant + dt)
                    } else {
                        1.0
                    };
                    joint.position += alpha * (joint.latched - joint.position);
                }
                Some(InterfaceKind::Velocity) => joint.position += joint.latched * dt,
                Some(InterfaceKind::Effort) => effort = joint.latched,
                Some(InterfaceKind::JointState) | None => {}
            }
            let velocity = if dt > 0.0 {
                (joint.position - previous) / dt
            } else {
                0.0
            };
            joint.handle.set_state(joint.position, velocity, effort);
        }
    }

    fn write(&mut self, _now: Instant, _period: Duration) {
        for joint in self.joints.values_mut() {
            if joint.owner.is_some() {
                joint.latched = joint.handle.command();
            }
        }
    }
}
