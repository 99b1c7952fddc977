//! Hardware abstraction trait and the joint handles it exposes.
//!
//! This module defines:
//! - `JointHandle` - lock-free shared joint state + command cell
//! - `HardwareInterfaces` - catalogue of handles per interface kind
//! - `RobotHardware` trait - the backend the periodic cycle drives

use crate::types::{ControllerInfo, InterfaceKind};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// `f64` stored as raw bits in an `AtomicU64`.
#[derive(Debug, Default)]
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    #[inline]
    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    #[inline]
    fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}

#[derive(Debug, Default)]
struct JointData {
    position: AtomicF64,
    velocity: AtomicF64,
    effort: AtomicF64,
    command: AtomicF64,
}

/// Shared view of one joint.
///
/// The hardware writes state in `read()` and consumes the command in
/// `write()`; controllers read state and set the command in `update()`.
/// Every access is a single atomic load or store, so neither side ever
/// blocks the other.
#[derive(Debug, Clone)]
pub struct JointHandle {
    name: Arc<str>,
    data: Arc<JointData>,
}

impl JointHandle {
    /// New joint with all values zeroed.
    pub fn new(name: &str) -> Self {
        Self::with_position(name, 0.0)
    }

    /// New joint at an initial position; the command starts equal to it.
    pub fn with_position(name: &str, position: f64) -> Self {
        Self {
            name: Arc::from(name),
            data: Arc::new(JointData {
                position: AtomicF64::new(position),
                command: AtomicF64::new(position),
                ..Default::default()
            }),
        }
    }

    /// Joint (resource) name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Measured position.
    #[inline]
    pub fn position(&self) -> f64 {
        self.data.position.load()
    }

    /// Measured velocity.
    #[inline]
    pub fn velocity(&self) -> f64 {
        self.data.velocity.load()
    }

    /// Measured effort.
    #[inline]
    pub fn effort(&self) -> f64 {
        self.data.effort.load()
    }

    /// Last command written by a controller.
    #[inline]
    pub fn command(&self) -> f64 {
        self.data.command.load()
    }

    /// Write the command for the interface the joint is claimed through.
    #[inline]
    pub fn set_command(&self, value: f64) {
        self.data.command.store(value);
    }

    /// Publish measured state (hardware side).
    #[inline]
    pub fn set_state(&self, position: f64, velocity: f64, effort: f64) {
        self.data.position.store(position);
        self.data.velocity.store(velocity);
        self.data.effort.store(effort);
    }

    /// True if both handles refer to the same joint storage.
    pub fn same_joint(&self, other: &JointHandle) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

/// Catalogue of the handles a hardware backend exposes, per interface kind.
///
/// Built once from [`RobotHardware::interfaces`] and shared read-only with
/// every controller's `init_request`.
#[derive(Debug, Clone, Default)]
pub struct HardwareInterfaces {
    handles: BTreeMap<InterfaceKind, BTreeMap<String, JointHandle>>,
}

impl HardwareInterfaces {
    /// Empty catalogue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose `handle` through `kind`. Returns the handle it replaced.
    pub fn register(&mut self, kind: InterfaceKind, handle: JointHandle) -> Option<JointHandle> {
        self.handles
            .entry(kind)
            .or_default()
            .insert(handle.name().to_string(), handle)
    }

    /// Look up a resource through one interface kind.
    pub fn get(&self, kind: InterfaceKind, resource: &str) -> Option<&JointHandle> {
        self.handles.get(&kind).and_then(|m| m.get(resource))
    }

    /// True if `resource` is exposed through `kind`.
    pub fn contains(&self, kind: InterfaceKind, resource: &str) -> bool {
        self.get(kind, resource).is_some()
    }

    /// Resource names exposed through `kind`, sorted.
    pub fn resource_names(&self, kind: InterfaceKind) -> impl Iterator<Item = &str> {
        self.handles
            .get(&kind)
            .into_iter()
            .flat_map(|m| m.keys().map(String::as_str))
    }

    /// Interface kinds with at least one resource.
    pub fn kinds(&self) -> impl Iterator<Item = InterfaceKind> + '_ {
        self.handles
            .iter()
            .filter(|(_, m)| !m.is_empty())
            .map(|(k, _)| *k)
    }

    /// Total number of (kind, resource) entries.
    pub fn len(&self) -> usize {
        self.handles.values().map(BTreeMap::len).sum()
    }

    /// True when nothing is exposed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Trait defining the hardware backend driven by the controller manager.
///
/// # Lifecycle
///
/// 1. `interfaces()` - called once when the manager is constructed
/// 2. `check_for_conflict()` / `prepare_switch()` / `do_switch()` - called at
///    the start of a tick that carries a pending switch, in that order
/// 3. `read()` / `write()` - called every tick around the controller updates
///
/// # Timing Contracts
///
/// | Operation | RT Constraint |
/// |-----------|---------------|
/// | `interfaces()` | None (before the cycle starts) |
/// | `check_for_conflict()` | **HARD** |
/// | `prepare_switch()` | **HARD** |
/// | `do_switch()` | **HARD** |
/// | `read()` / `write()` | **HARD** |
///
/// A `true` from `check_for_conflict` or a `false` from `prepare_switch` is
/// a veto, not an error: the manager aborts the switch and changes nothing.
pub trait RobotHardware: Send {
    /// Backend identifier used in logs (e.g., "simulation").
    fn name(&self) -> &str;

    /// Handles this backend exposes to controllers.
    fn interfaces(&self) -> HardwareInterfaces;

    /// Veto a switch because of a backend-specific claim collision.
    ///
    /// Default: no conflict.
    fn check_for_conflict(&self, _stop: &[ControllerInfo], _start: &[ControllerInfo]) -> bool {
        false
    }

    /// Get ready for a switch; `false` refuses it.
    ///
    /// Default: always ready.
    fn prepare_switch(&mut self, _stop: &[ControllerInfo], _start: &[ControllerInfo]) -> bool {
        true
    }

    /// Physically commit a switch that `prepare_switch` approved.
    ///
    /// Default: no-op.
    fn do_switch(&mut self, _stop: &[ControllerInfo], _start: &[ControllerInfo]) {}

    /// Sample sensors into the joint handles.
    fn read(&mut self, now: Instant, period: Duration);

    /// Send the joint commands to the actuators.
    fn write(&mut self, now: Instant, period: Duration);
}
