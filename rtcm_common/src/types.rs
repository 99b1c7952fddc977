//! Value types shared between the manager, controllers and hardware.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Kind of hardware interface a resource is exposed through.
///
/// `JointState` is read-only and never claimed. The command kinds are
/// exclusive: a joint commanded through one of them belongs to exactly one
/// running controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceKind {
    /// Position / velocity / effort feedback.
    JointState,
    /// Position setpoint command.
    Position,
    /// Velocity setpoint command.
    Velocity,
    /// Effort (torque/force) command.
    Effort,
}

impl InterfaceKind {
    /// All command interface kinds.
    pub const COMMAND: [Self; 3] = [Self::Position, Self::Velocity, Self::Effort];

    /// True for interfaces that write to the hardware and must be claimed.
    #[inline]
    pub const fn is_command(self) -> bool {
        !matches!(self, Self::JointState)
    }

    /// Stable lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::JointState => "joint_state",
            Self::Position => "position",
            Self::Velocity => "velocity",
            Self::Effort => "effort",
        }
    }
}

impl fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resources claimed through one interface kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceResources {
    /// Interface the resources are commanded through.
    pub interface: InterfaceKind,
    /// Resource (joint) names.
    pub resources: BTreeSet<String>,
}

/// Everything a controller declared during `init_request`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimedResources {
    interfaces: Vec<InterfaceResources>,
}

impl ClaimedResources {
    /// Empty claim set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a claim on `resource` through `interface`.
    pub fn claim(&mut self, interface: InterfaceKind, resource: impl Into<String>) {
        let resource = resource.into();
        match self.interfaces.iter_mut().find(|i| i.interface == interface) {
            Some(entry) => {
                entry.resources.insert(resource);
            }
            None => self.interfaces.push(InterfaceResources {
                interface,
                resources: BTreeSet::from([resource]),
            }),
        }
    }

    /// Per-interface claim groups, in declaration order.
    pub fn interfaces(&self) -> &[InterfaceResources] {
        &self.interfaces
    }

    /// Distinct resource names across all interfaces.
    ///
    /// Claim exclusivity is per resource: the same joint claimed through two
    /// different interfaces by two controllers still collides.
    pub fn resource_set(&self) -> BTreeSet<&str> {
        self.interfaces
            .iter()
            .flat_map(|i| i.resources.iter().map(String::as_str))
            .collect()
    }

    /// Interface a resource is claimed through, if claimed at all.
    pub fn interface_of(&self, resource: &str) -> Option<InterfaceKind> {
        self.interfaces
            .iter()
            .find(|i| i.resources.contains(resource))
            .map(|i| i.interface)
    }

    /// First resource present in both claim sets.
    pub fn overlap<'a>(&'a self, other: &ClaimedResources) -> Option<&'a str> {
        let theirs = other.resource_set();
        self.resource_set().into_iter().find(|r| theirs.contains(r))
    }

    /// True when nothing is claimed.
    pub fn is_empty(&self) -> bool {
        self.interfaces.iter().all(|i| i.resources.is_empty())
    }
}

/// Identity and claims of a loaded controller, as handed to the hardware
/// during a switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerInfo {
    /// Unique controller name.
    pub name: String,
    /// Controller type, as declared by its loader.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Resources declared in `init_request`.
    pub claimed: ClaimedResources,
}

impl ControllerInfo {
    /// Info with no claims yet.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            claimed: ClaimedResources::new(),
        }
    }
}

/// Controller lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Instantiated, `init_request` not yet run.
    #[default]
    Constructed,
    /// Initialized; claims declared, never started.
    Initialized,
    /// Receiving `update` every tick.
    Running,
    /// Stopped by a switch or a runtime fault.
    Stopped,
}

impl LifecycleState {
    /// True while the controller is updated each tick.
    #[inline]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }

    /// True if a switch may start the controller from this state.
    #[inline]
    pub const fn can_start(self) -> bool {
        matches!(self, Self::Initialized | Self::Stopped)
    }

    /// Stable lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Constructed => "constructed",
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a switch request treats invalid entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    /// Any invalid entry or conflict aborts the whole request.
    #[default]
    Strict,
    /// Invalid entries are dropped and the remainder is applied.
    BestEffort,
}
