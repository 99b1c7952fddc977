//! Controller instance: one loaded algorithm plus its lifecycle.
//!
//! `Constructed → Initialized → Running ⇄ Stopped`
//!
//! | From | Event | To |
//! |------|-------|----|
//! | Constructed | InitSucceeded | Initialized |
//! | Initialized / Stopped | Start | Running |
//! | Running | Stop | Stopped |
//! | Initialized / Running / Stopped | Fault | Stopped |
//!
//! `Constructed` never leaves except through a successful `init_request`;
//! a failed init leaves the instance unusable and it is never inserted into
//! the controller set.

use crate::error::ManagerError;
use rtcm_common::controller::{Controller, ControllerError, InitContext};
use rtcm_common::hardware::HardwareInterfaces;
use rtcm_common::types::{ClaimedResources, ControllerInfo, LifecycleState};
use std::time::{Duration, Instant};

/// Result of a lifecycle transition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition succeeded; new state.
    Ok(LifecycleState),
    /// Transition rejected, with the reason.
    Rejected(&'static str),
}

/// Lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// `init_request` returned Ok.
    InitSucceeded,
    /// `starting` returned Ok.
    Start,
    /// `stopping` ran.
    Stop,
    /// `starting`, `update` or `stopping` returned an error.
    Fault,
}

/// Lifecycle state holder.
#[derive(Debug, Clone, Default)]
pub struct LifecycleMachine {
    state: LifecycleState,
}

impl LifecycleMachine {
    pub const fn new() -> Self {
        Self {
            state: LifecycleState::Constructed,
        }
    }

    #[inline]
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// Attempt a transition.
    pub fn handle_event(&mut self, event: LifecycleEvent) -> TransitionResult {
        use LifecycleEvent::*;
        use LifecycleState::*;

        let next = match (self.state, event) {
            (Constructed, InitSucceeded) => Initialized,
            (Initialized | Stopped, Start) => Running,
            (Running, Stop) => Stopped,
            (Initialized | Running | Stopped, Fault) => Stopped,
            _ => return TransitionResult::Rejected(invalid_transition_reason(self.state, event)),
        };

        self.state = next;
        TransitionResult::Ok(next)
    }
}

fn invalid_transition_reason(state: LifecycleState, event: LifecycleEvent) -> &'static str {
    use LifecycleEvent::*;
    use LifecycleState::*;
    match (state, event) {
        (Constructed, _) => "Constructed: only InitSucceeded allowed",
        (_, InitSucceeded) => "already initialized",
        (Running, Start) => "already running",
        (_, Stop) => "not running",
        _ => "invalid event for current state",
    }
}

/// A loaded controller, owned by the controller set.
pub struct ControllerInstance {
    info: ControllerInfo,
    lifecycle: LifecycleMachine,
    algorithm: Box<dyn Controller>,
}

impl std::fmt::Debug for ControllerInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerInstance")
            .field("info", &self.info)
            .field("state", &self.lifecycle.state())
            .finish_non_exhaustive()
    }
}

impl ControllerInstance {
    /// Freshly constructed instance.
    pub fn new(
        name: impl Into<String>,
        type_name: impl Into<String>,
        algorithm: Box<dyn Controller>,
    ) -> Self {
        Self {
            info: ControllerInfo::new(name, type_name),
            lifecycle: LifecycleMachine::new(),
            algorithm,
        }
    }

    pub fn info(&self) -> &ControllerInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn claimed(&self) -> &ClaimedResources {
        &self.info.claimed
    }

    /// Run the one-time `init_request` and record the declared claims.
    ///
    /// # Errors
    /// `ManagerError::ControllerInitFailed` if the controller rejects its
    /// parameters or hardware, or if it was already initialized.
    pub fn init_request(
        &mut self,
        hardware: &HardwareInterfaces,
        params: &toml::Table,
    ) -> Result<(), ManagerError> {
        let init_failed = |reason: String| ManagerError::ControllerInitFailed {
            name: self.info.name.clone(),
            reason,
        };
        if self.state() != LifecycleState::Constructed {
            return Err(init_failed("already initialized".to_string()));
        }

        let ctx = InitContext::new(&self.info.name, hardware, params);
        let mut claimed = ClaimedResources::new();
        self.algorithm
            .init_request(&ctx, &mut claimed)
            .map_err(|e| init_failed(e.to_string()))?;

        self.info.claimed = claimed;
        self.lifecycle.handle_event(LifecycleEvent::InitSucceeded);
        Ok(())
    }

    /// Call `starting` and enter `Running`.
    ///
    /// An error forces the instance to `Stopped`.
    pub fn start(&mut self, now: Instant) -> Result<(), ControllerError> {
        if !self.state().can_start() {
            return Err(ControllerError::Fault(format!(
                "cannot start from {}",
                self.state()
            )));
        }
        match self.algorithm.starting(now) {
            Ok(()) => {
                self.lifecycle.handle_event(LifecycleEvent::Start);
                Ok(())
            }
            Err(e) => {
                self.lifecycle.handle_event(LifecycleEvent::Fault);
                Err(e)
            }
        }
    }

    /// Call `stopping` and enter `Stopped`, whether or not it succeeded.
    pub fn stop(&mut self, now: Instant) -> Result<(), ControllerError> {
        if !self.state().is_running() {
            return Ok(());
        }
        let result = self.algorithm.stopping(now);
        let event = if result.is_ok() {
            LifecycleEvent::Stop
        } else {
            LifecycleEvent::Fault
        };
        self.lifecycle.handle_event(event);
        result
    }

    /// One control step; no-op unless running.
    ///
    /// An error forces the instance to `Stopped` without calling `stopping`.
    #[inline]
    pub fn update(&mut self, now: Instant, period: Duration) -> Result<(), ControllerError> {
        if !self.state().is_running() {
            return Ok(());
        }
        let result = self.algorithm.update(now, period);
        if result.is_err() {
            self.lifecycle.handle_event(LifecycleEvent::Fault);
        }
        result
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
