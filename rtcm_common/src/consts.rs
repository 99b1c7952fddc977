//! System-wide constants for the RTCM workspace.
//!
//! Single source of truth for numeric limits and default paths.

/// Default periodic cycle time in microseconds (1 kHz = 1000 µs).
pub const DEFAULT_CYCLE_TIME_US: u32 = 1000;

/// Shortest cycle time accepted by config validation.
pub const MIN_CYCLE_TIME_US: u32 = 100;

/// Longest cycle time accepted by config validation (10 Hz).
pub const MAX_CYCLE_TIME_US: u32 = 100_000;

/// Default SCHED_FIFO priority for the periodic thread.
pub const DEFAULT_RT_PRIORITY: i32 = 80;

/// Default CPU core the periodic thread is pinned to.
pub const DEFAULT_CPU_CORE: usize = 1;

/// Number of runtime faults kept in the introspection history.
pub const FAULT_HISTORY_LEN: usize = 32;

/// Overrun warnings logged verbatim before switching to every 1000th.
pub const OVERRUN_LOG_LIMIT: u64 = 10;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/rtcm/rtcm.toml";
