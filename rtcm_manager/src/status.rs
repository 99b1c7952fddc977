//! Published, read-only view of the manager state.
//!
//! The periodic thread rebuilds [`ManagerView`] after every commit or fault;
//! callers only ever see owned snapshots taken from it.

use rtcm_common::consts::FAULT_HISTORY_LEN;
use rtcm_common::types::{ClaimedResources, ControllerInfo, LifecycleState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle callback in which a runtime fault occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultPhase {
    Starting,
    Update,
    Stopping,
}

impl fmt::Display for FaultPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Starting => "starting",
            Self::Update => "update",
            Self::Stopping => "stopping",
        })
    }
}

/// One recorded runtime fault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerFault {
    /// Faulting controller.
    pub controller: String,
    /// Callback that failed.
    pub phase: FaultPhase,
    /// Controller error text.
    pub message: String,
    /// Tick counter at the time of the fault.
    pub tick: u64,
}

/// Snapshot of one loaded controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub state: LifecycleState,
    pub claimed: ClaimedResources,
}

impl ControllerStatus {
    pub(crate) fn new(info: &ControllerInfo, state: LifecycleState) -> Self {
        Self {
            name: info.name.clone(),
            type_name: info.type_name.clone(),
            state,
            claimed: info.claimed.clone(),
        }
    }
}

/// State published by the periodic thread.
#[derive(Debug, Clone, Default)]
pub struct ManagerView {
    /// Loaded controllers in registration order.
    pub controllers: Vec<ControllerStatus>,
    /// Resource → holding controller.
    pub claims: BTreeMap<String, String>,
    /// Most recent runtime faults, oldest first.
    pub faults: heapless::Deque<ControllerFault, FAULT_HISTORY_LEN>,
}

impl ManagerView {
    /// Status of `name`, if loaded.
    pub fn controller(&self, name: &str) -> Option<&ControllerStatus> {
        self.controllers.iter().find(|c| c.name == name)
    }

    /// Append a fault, evicting the oldest once the history is full.
    pub fn record_fault(&mut self, fault: ControllerFault) {
        if self.faults.is_full() {
            self.faults.pop_front();
        }
        // Cannot fail: a slot was freed above.
        let _ = self.faults.push_back(fault);
    }
}

/// JSON status document written by `--status-json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    /// Ticks executed so far.
    pub ticks: u64,
    /// True while a request waits for the next tick.
    pub pending_request: bool,
    pub controllers: Vec<ControllerStatus>,
    pub claims: BTreeMap<String, String>,
    pub faults: Vec<ControllerFault>,
}
