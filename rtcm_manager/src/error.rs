//! Error type returned by every `ControllerManager` operation.
//!
//! Display strings carry a stable `ERR_*` code prefix so operators can grep
//! logs; [`ManagerError::code`] exposes the same code programmatically.

use crate::status::FaultPhase;
use rtcm_common::controller::ControllerError;
use thiserror::Error;

/// Outcome of a failed load, unload or switch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ManagerError {
    /// Name not found in the controller set (or in the registered specs).
    #[error("ERR_UNKNOWN_CONTROLLER: '{0}'")]
    UnknownController(String),

    /// Request contradicts itself or the current lifecycle states.
    #[error("ERR_CONFLICTING_REQUEST: {0}")]
    ConflictingRequest(String),

    /// A starter needs a resource held by a controller that keeps running,
    /// or the hardware vetoed the switch.
    #[error("ERR_RESOURCE_CONFLICT: {0}")]
    ResourceConflict(String),

    /// Hardware `prepare_switch` refused the switch.
    #[error("ERR_PREPARE_FAILED: hardware refused the switch")]
    PrepareFailed,

    /// Another request is in flight.
    #[error("ERR_ALREADY_PENDING: another request is being processed")]
    AlreadyPending,

    /// Instantiation or `init_request` failed.
    #[error("ERR_CONTROLLER_INIT_FAILED: '{name}': {reason}")]
    ControllerInitFailed { name: String, reason: String },

    /// `starting`, `update` or `stopping` failed.
    #[error("ERR_CONTROLLER_RUNTIME_FAULT: '{name}' failed in {phase}: {source}")]
    RuntimeFault {
        name: String,
        phase: FaultPhase,
        #[source]
        source: ControllerError,
    },

    /// No registered loader declares the requested type.
    #[error("ERR_UNKNOWN_TYPE: no loader declares '{0}'")]
    UnknownType(String),

    /// A controller with this name is already in the set.
    #[error("ERR_ALREADY_LOADED: '{0}'")]
    AlreadyLoaded(String),

    /// Unload of a running controller.
    #[error("ERR_STILL_RUNNING: '{0}' must be stopped before unloading")]
    StillRunning(String),

    /// The periodic thread has exited; no request will be served.
    #[error("ERR_SHUT_DOWN: the periodic update thread is not running")]
    ShutDown,
}

impl ManagerError {
    /// Stable error code, identical to the Display prefix.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnknownController(_) => "ERR_UNKNOWN_CONTROLLER",
            Self::ConflictingRequest(_) => "ERR_CONFLICTING_REQUEST",
            Self::ResourceConflict(_) => "ERR_RESOURCE_CONFLICT",
            Self::PrepareFailed => "ERR_PREPARE_FAILED",
            Self::AlreadyPending => "ERR_ALREADY_PENDING",
            Self::ControllerInitFailed { .. } => "ERR_CONTROLLER_INIT_FAILED",
            Self::RuntimeFault { .. } => "ERR_CONTROLLER_RUNTIME_FAULT",
            Self::UnknownType(_) => "ERR_UNKNOWN_TYPE",
            Self::AlreadyLoaded(_) => "ERR_ALREADY_LOADED",
            Self::StillRunning(_) => "ERR_STILL_RUNNING",
            Self::ShutDown => "ERR_SHUT_DOWN",
        }
    }
}
