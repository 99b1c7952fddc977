//! `rtcm_manager` configuration file.
//!
//! ```toml
//! [shared]
//! service_name = "rtcm"
//!
//! [cycle]
//! cycle_time_us = 1000
//!
//! [[hardware.joints]]
//! name = "joint1"
//!
//! [[controllers]]
//! name = "joint1_position"
//! type = "JointPositionController"
//! autostart = true
//! [controllers.params]
//! joints = ["joint1"]
//! ```

use crate::sim::SimHardwareConfig;
use rtcm_common::config::{ConfigError, SharedConfig, Validate};
use rtcm_common::consts::{
    DEFAULT_CPU_CORE, DEFAULT_CYCLE_TIME_US, DEFAULT_RT_PRIORITY, MAX_CYCLE_TIME_US,
    MIN_CYCLE_TIME_US,
};
use rtcm_common::controller::ControllerSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

fn default_cycle_time_us() -> u32 {
    DEFAULT_CYCLE_TIME_US
}

fn default_cpu_core() -> usize {
    DEFAULT_CPU_CORE
}

fn default_rt_priority() -> i32 {
    DEFAULT_RT_PRIORITY
}

/// `[cycle]` section: periodic thread pacing and RT setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleConfig {
    /// Tick period [µs].
    #[serde(default = "default_cycle_time_us")]
    pub cycle_time_us: u32,
    /// CPU core the periodic thread is pinned to (`rt` feature).
    #[serde(default = "default_cpu_core")]
    pub cpu_core: usize,
    /// SCHED_FIFO priority (`rt` feature).
    #[serde(default = "default_rt_priority")]
    pub rt_priority: i32,
    /// Stop the cycle on the first overrun instead of logging it.
    #[serde(default)]
    pub abort_on_overrun: bool,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            cycle_time_us: DEFAULT_CYCLE_TIME_US,
            cpu_core: DEFAULT_CPU_CORE,
            rt_priority: DEFAULT_RT_PRIORITY,
            abort_on_overrun: false,
        }
    }
}

impl CycleConfig {
    /// Tick period.
    pub fn period(&self) -> Duration {
        Duration::from_micros(u64::from(self.cycle_time_us))
    }
}

impl Validate for CycleConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_CYCLE_TIME_US..=MAX_CYCLE_TIME_US).contains(&self.cycle_time_us) {
            return Err(ConfigError::ValidationError(format!(
                "cycle_time_us {} outside [{MIN_CYCLE_TIME_US}, {MAX_CYCLE_TIME_US}]",
                self.cycle_time_us
            )));
        }
        if !(1..=99).contains(&self.rt_priority) {
            return Err(ConfigError::ValidationError(format!(
                "rt_priority {} outside [1, 99]",
                self.rt_priority
            )));
        }
        Ok(())
    }
}

/// Complete `rtcm_manager` configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfig {
    pub shared: SharedConfig,
    #[serde(default)]
    pub cycle: CycleConfig,
    #[serde(default)]
    pub hardware: SimHardwareConfig,
    #[serde(default)]
    pub controllers: Vec<ControllerSpec>,
}

impl Validate for ManagerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.cycle.validate()?;

        let mut joints = BTreeSet::new();
        for joint in &self.hardware.joints {
            if !joints.insert(joint.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate joint '{}'",
                    joint.name
                )));
            }
        }

        let mut names = BTreeSet::new();
        for spec in &self.controllers {
            if spec.name.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "controller name cannot be empty".to_string(),
                ));
            }
            if spec.type_name.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "controller '{}' has no type",
                    spec.name
                )));
            }
            if !names.insert(spec.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate controller '{}'",
                    spec.name
                )));
            }
        }
        Ok(())
    }
}
