//! Prelude module for common re-exports.
//!
//! `use rtcm_common::prelude::*;` brings in everything a controller or a
//! hardware backend implementation needs.

use std::time::Duration;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig, Validate};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{DEFAULT_CYCLE_TIME_US, FAULT_HISTORY_LEN};

// ─── Controllers ────────────────────────────────────────────────────
pub use crate::controller::{
    Controller, ControllerError, ControllerFactory, ControllerLoader, ControllerSpec, InitContext,
};

// ─── Hardware ───────────────────────────────────────────────────────
pub use crate::hardware::{HardwareInterfaces, JointHandle, RobotHardware};

// ─── Shared Types ───────────────────────────────────────────────────
pub use crate::types::{
    ClaimedResources, ControllerInfo, InterfaceKind, InterfaceResources, LifecycleState,
    Strictness,
};

/// Default cycle period as a `Duration`.
pub const DEFAULT_CYCLE_TIME: Duration = Duration::from_micros(DEFAULT_CYCLE_TIME_US as u64);
