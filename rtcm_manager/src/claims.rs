//! Resource claim registry.
//!
//! Maps each claimed hardware resource to the running controller that holds
//! it. A resource is held by at most one running controller at any time.
//!
//! Claims change in two steps: [`ClaimRegistry::reserve`] checks a switch
//! and returns a [`Reservation`] without touching the registry;
//! [`ClaimRegistry::commit`] applies it once the switch has gone through.
//! Dropping a reservation leaves the registry unchanged.

use rtcm_common::types::ControllerInfo;
use std::collections::BTreeMap;
use std::fmt;

/// Where a conflicting claim comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// Two starters of the same request want the resource.
    SameRequest,
    /// A controller that keeps running holds the resource.
    Running,
}

/// A resource two controllers want at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimConflict {
    pub resource: String,
    /// Starter that asked for the resource.
    pub requested_by: String,
    /// Other starter or current holder.
    pub held_by: String,
    pub kind: ConflictKind,
}

impl fmt::Display for ClaimConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ConflictKind::SameRequest => write!(
                f,
                "'{}' and '{}' both claim '{}'",
                self.held_by, self.requested_by, self.resource
            ),
            ConflictKind::Running => write!(
                f,
                "'{}' claims '{}' held by running controller '{}'",
                self.requested_by, self.resource, self.held_by
            ),
        }
    }
}

/// Claim changes approved by [`ClaimRegistry::reserve`].
#[must_use = "a reservation does nothing until committed"]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reservation {
    release: Vec<String>,
    acquire: Vec<(String, String)>,
}

impl Reservation {
    /// Drop every resource reserved for `controller` (its start failed).
    pub fn forfeit(&mut self, controller: &str) {
        self.acquire.retain(|(_, holder)| holder != controller);
    }

    /// Resources this reservation would hand out, with their new holders.
    pub fn acquired(&self) -> impl Iterator<Item = (&str, &str)> {
        self.acquire.iter().map(|(r, c)| (r.as_str(), c.as_str()))
    }
}

/// Resource → holding controller.
#[derive(Debug, Clone, Default)]
pub struct ClaimRegistry {
    holders: BTreeMap<String, String>,
}

impl ClaimRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// First conflict a switch would cause, if any.
    ///
    /// Overlap between starters is checked before current claims. A resource
    /// held by a controller in `stop` is free for the starters.
    pub fn check_for_conflict(
        &self,
        stop: &[ControllerInfo],
        start: &[ControllerInfo],
    ) -> Option<ClaimConflict> {
        for (i, later) in start.iter().enumerate() {
            for earlier in &start[..i] {
                if let Some(resource) = later.claimed.overlap(&earlier.claimed) {
                    return Some(ClaimConflict {
                        resource: resource.to_string(),
                        requested_by: later.name.clone(),
                        held_by: earlier.name.clone(),
                        kind: ConflictKind::SameRequest,
                    });
                }
            }
        }

        for starter in start {
            for resource in starter.claimed.resource_set() {
                let Some(holder) = self.holders.get(resource) else {
                    continue;
                };
                if holder == &starter.name || stop.iter().any(|s| &s.name == holder) {
                    continue;
                }
                return Some(ClaimConflict {
                    resource: resource.to_string(),
                    requested_by: starter.name.clone(),
                    held_by: holder.clone(),
                    kind: ConflictKind::Running,
                });
            }
        }
        None
    }

    /// Check a switch and describe its claim changes.
    pub fn reserve(
        &self,
        stop: &[ControllerInfo],
        start: &[ControllerInfo],
    ) -> Result<Reservation, ClaimConflict> {
        if let Some(conflict) = self.check_for_conflict(stop, start) {
            return Err(conflict);
        }
        Ok(Reservation {
            release: stop.iter().map(|s| s.name.clone()).collect(),
            acquire: start
                .iter()
                .flat_map(|s| {
                    s.claimed
                        .resource_set()
                        .into_iter()
                        .map(move |r| (r.to_string(), s.name.clone()))
                })
                .collect(),
        })
    }

    /// Apply a reservation.
    pub fn commit(&mut self, reservation: Reservation) {
        for controller in &reservation.release {
            self.release(controller);
        }
        for (resource, controller) in reservation.acquire {
            self.holders.insert(resource, controller);
        }
    }

    /// Drop every claim held by `controller`.
    pub fn release(&mut self, controller: &str) {
        self.holders.retain(|_, holder| holder != controller);
    }

    /// Controller holding `resource`.
    #[cfg(test)]
    fn holder(&self, resource: &str) -> Option<&str> {
        self.holders.get(resource).map(String::as_str)
    }

    /// All current claims.
    pub fn claims(&self) -> &BTreeMap<String, String> {
        &self.holders
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }
}
