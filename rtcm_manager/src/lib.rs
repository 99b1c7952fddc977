//! # RTCM Controller Manager
//!
//! Loads controllers, arbitrates their claims on hardware resources and
//! switches them atomically inside a periodic update loop.
//!
//! ## Layers
//!
//! 1. **ControllerInstance**: one controller and its lifecycle
//!    (`constructed → initialized → running ⇄ stopped`)
//! 2. **ControllerSet**: loaded instances in registration order
//! 3. **ClaimRegistry**: exclusive resource → controller ownership
//! 4. **ControllerManager**: caller-facing requests, handed to the
//!    periodic thread through a single-slot rendezvous
//! 5. **CycleRunner**: paces `ControllerManager::update`
//!
//! The periodic thread never waits on a caller. Callers block until their
//! request has been executed by a tick.

pub mod claims;
pub mod config;
pub mod controller_registry;
pub mod controllers;
pub mod cycle;
pub mod error;
pub mod instance;
pub mod manager;
pub mod set;
pub mod sim;
pub mod slot;
pub mod status;
pub mod switch;

pub use config::{CycleConfig, ManagerConfig};
pub use controller_registry::ControllerRegistry;
pub use cycle::{CycleError, CycleHandle, CycleRunner, CycleStats};
pub use error::ManagerError;
pub use manager::ControllerManager;
pub use sim::SimHardware;
pub use status::{ControllerFault, ControllerStatus, FaultPhase, StatusReport};
pub use switch::SwitchRequest;
