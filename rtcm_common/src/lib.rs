//! RTCM Common Library
//!
//! Shared vocabulary for the real-time controller manager workspace: the
//! traits a controller or a hardware backend implements, the value types the
//! manager passes between them, and the TOML configuration loading used by
//! every binary.
//!
//! # Module Structure
//!
//! - [`config`] - Configuration loading traits and types
//! - [`consts`] - Workspace-wide limits and defaults
//! - [`controller`] - `Controller` / `ControllerLoader` traits
//! - [`hardware`] - `RobotHardware` trait, joint handles, interface catalogue
//! - [`types`] - Claims, controller identity, lifecycle state, strictness
//! - [`prelude`] - Common re-exports for convenience

pub mod config;
pub mod consts;
pub mod controller;
pub mod hardware;
pub mod prelude;
pub mod types;
