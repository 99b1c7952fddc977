//! Switch requests and their validation.
//!
//! Validation runs twice: on the calling thread against the published view,
//! so that bad requests fail before anything is installed, and again on the
//! periodic thread against the live controller set, because a runtime fault
//! may have changed a state in between.
//!
//! Checks, in order:
//! 1. every name resolves to a loaded controller
//! 2. no name is both started and stopped
//! 3. stoppers are `Running`, starters are `Initialized` or `Stopped`
//! 4. no two starters claim the same resource
//!
//! `Strict` returns the first failure. `BestEffort` drops the offending
//! entries, logs them, and keeps going.

use crate::error::ManagerError;
use rtcm_common::types::{ClaimedResources, LifecycleState, Strictness};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Caller-side switch request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchRequest {
    #[serde(default)]
    pub start: Vec<String>,
    #[serde(default)]
    pub stop: Vec<String>,
    #[serde(default)]
    pub strictness: Strictness,
}

impl SwitchRequest {
    /// Empty request.
    pub fn new(strictness: Strictness) -> Self {
        Self {
            start: Vec::new(),
            stop: Vec::new(),
            strictness,
        }
    }

    /// Request from name lists.
    pub fn from_lists(start: &[&str], stop: &[&str], strictness: Strictness) -> Self {
        Self {
            start: start.iter().map(|s| s.to_string()).collect(),
            stop: stop.iter().map(|s| s.to_string()).collect(),
            strictness,
        }
    }

    /// Builder-style: add a controller to start.
    pub fn start(mut self, name: impl Into<String>) -> Self {
        self.start.push(name.into());
        self
    }

    /// Builder-style: add a controller to stop.
    pub fn stop(mut self, name: impl Into<String>) -> Self {
        self.stop.push(name.into());
        self
    }
}

/// Validated request: unique, known names in valid states.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwitchPlan {
    pub start: Vec<String>,
    pub stop: Vec<String>,
    pub strictness: Strictness,
}

impl SwitchPlan {
    /// True when nothing is started or stopped.
    pub fn is_empty(&self) -> bool {
        self.start.is_empty() && self.stop.is_empty()
    }

    /// Same lists, as a request to validate again.
    pub fn to_request(&self) -> SwitchRequest {
        SwitchRequest {
            start: self.start.clone(),
            stop: self.stop.clone(),
            strictness: self.strictness,
        }
    }
}

/// Validate `request`, looking controllers up through `lookup`.
///
/// # Errors
/// - `ManagerError::UnknownController` for an unresolved name (`Strict`)
/// - `ManagerError::ConflictingRequest` for any other failed check (`Strict`)
pub fn validate<'a, F>(request: &SwitchRequest, lookup: F) -> Result<SwitchPlan, ManagerError>
where
    F: Fn(&str) -> Option<(LifecycleState, &'a ClaimedResources)>,
{
    let strictness = request.strictness;
    let mut start = dedup(&request.start);
    let mut stop = dedup(&request.stop);

    // 1. Resolve names.
    let unknown = |name: &str| match lookup(name) {
        Some(_) => Ok(()),
        None => Err(ManagerError::UnknownController(name.to_string())),
    };
    start = filter(start, strictness, unknown)?;
    stop = filter(stop, strictness, unknown)?;

    // 2. Same name in both lists.
    let in_both: Vec<String> = start.iter().filter(|s| stop.contains(s)).cloned().collect();
    if let Some(name) = in_both.first() {
        let err = ManagerError::ConflictingRequest(format!(
            "'{name}' is in both the start and stop lists"
        ));
        if strictness == Strictness::Strict {
            return Err(err);
        }
        warn!(error = %err, dropped = ?in_both, "Dropping from switch request");
        start.retain(|s| !in_both.contains(s));
        stop.retain(|s| !in_both.contains(s));
    }

    // 3. Lifecycle preconditions.
    stop = filter(stop, strictness, |name| match lookup(name) {
        Some((state, _)) if state.is_running() => Ok(()),
        Some((state, _)) => Err(ManagerError::ConflictingRequest(format!(
            "cannot stop '{name}': it is {state}"
        ))),
        None => Err(ManagerError::UnknownController(name.to_string())),
    })?;
    start = filter(start, strictness, |name| match lookup(name) {
        Some((state, _)) if state.can_start() => Ok(()),
        Some((state, _)) => Err(ManagerError::ConflictingRequest(format!(
            "cannot start '{name}': it is {state}"
        ))),
        None => Err(ManagerError::UnknownController(name.to_string())),
    })?;

    // 4. Starters overlapping on a resource; the earlier entry wins.
    let mut accepted: Vec<(String, &ClaimedResources)> = Vec::with_capacity(start.len());
    for name in start {
        let Some((_, claimed)) = lookup(&name) else {
            continue;
        };
        let clash = accepted
            .iter()
            .find_map(|(other, theirs)| claimed.overlap(theirs).map(|r| (other, r)));
        match clash {
            None => accepted.push((name, claimed)),
            Some((other, resource)) => {
                let err = ManagerError::ConflictingRequest(format!(
                    "'{other}' and '{name}' both claim '{resource}'"
                ));
                if strictness == Strictness::Strict {
                    return Err(err);
                }
                warn!(error = %err, dropped = %name, "Dropping from switch request");
            }
        }
    }

    Ok(SwitchPlan {
        start: accepted.into_iter().map(|(name, _)| name).collect(),
        stop,
        strictness,
    })
}

fn dedup(names: &[String]) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        if !unique.contains(name) {
            unique.push(name.clone());
        }
    }
    unique
}

fn filter<F>(names: Vec<String>, strictness: Strictness, check: F) -> Result<Vec<String>, ManagerError>
where
    F: Fn(&str) -> Result<(), ManagerError>,
{
    let mut kept = Vec::with_capacity(names.len());
    for name in names {
        match check(&name) {
            Ok(()) => kept.push(name),
            Err(err) if strictness == Strictness::Strict => return Err(err),
            Err(err) => warn!(error = %err, dropped = %name, "Dropping from switch request"),
        }
    }
    Ok(kept)
}
