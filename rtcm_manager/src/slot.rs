//! Single-slot rendezvous between request callers and the periodic thread.
//!
//! A caller claims the slot, validates its request on its own thread,
//! installs it and sleeps on a condition variable. The periodic thread polls
//! an atomic flag and only ever `try_lock`s the slot; it executes the
//! request and completes it through the [`SlotTicket`] it obtained, so it
//! never waits on a caller.
//!
//! ```text
//! caller                          periodic thread
//! ──────                          ───────────────
//! busy: false → true
//! prepare()  (validation)
//! lock, install, pending = true
//! wait on `done`  ─────────────▶  pending? → try_lock → take request
//!                                 ...execute...
//!        ◀─────────────────────   store outcome, pending = false, notify
//! take outcome, busy = false
//! ```
//!
//! Once the periodic thread is gone the slot is closed: an installed
//! request is completed with `ManagerError::ShutDown` and every later
//! `submit` fails with the same error.

use crate::error::ManagerError;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};

struct SlotState<R, T> {
    request: Option<R>,
    outcome: Option<Result<T, ManagerError>>,
}

/// Rendezvous slot carrying requests of type `R` with outcomes of type `T`.
pub struct RequestSlot<R, T> {
    /// A caller owns the slot (validating, installed or waiting).
    busy: AtomicBool,
    /// An installed request awaits the periodic thread.
    pending: AtomicBool,
    /// No periodic thread will serve the slot again.
    closed: AtomicBool,
    state: Mutex<SlotState<R, T>>,
    done: Condvar,
}

impl<R, T> Default for RequestSlot<R, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Clears `busy` however `submit` exits.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<R, T> RequestSlot<R, T> {
    pub fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
            pending: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            state: Mutex::new(SlotState {
                request: None,
                outcome: None,
            }),
            done: Condvar::new(),
        }
    }

    /// Build a request with `prepare`, hand it to the periodic thread and
    /// block until it has been executed.
    ///
    /// # Errors
    /// - `ManagerError::AlreadyPending` immediately if another caller owns
    ///   the slot; nothing is installed
    /// - `ManagerError::ShutDown` if the slot is closed, or closes while
    ///   the request waits
    /// - whatever `prepare` returns; nothing is installed
    /// - the outcome reported by the periodic thread
    pub fn submit<F>(&self, prepare: F) -> Result<T, ManagerError>
    where
        F: FnOnce() -> Result<R, ManagerError>,
    {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ManagerError::AlreadyPending);
        }
        let _busy = BusyGuard(&self.busy);
        if self.is_closed() {
            return Err(ManagerError::ShutDown);
        }

        let request = prepare()?;

        let mut state = self.state.lock();
        // `close` may have run while `prepare` did.
        if self.is_closed() {
            return Err(ManagerError::ShutDown);
        }
        state.outcome = None;
        state.request = Some(request);
        self.pending.store(true, Ordering::Release);

        loop {
            if let Some(outcome) = state.outcome.take() {
                return outcome;
            }
            self.done.wait(&mut state);
        }
    }

    /// Non-blocking poll from the periodic thread.
    ///
    /// Returns `None` when nothing is pending or the slot lock is briefly
    /// held by a caller; the request is then picked up next tick.
    pub fn try_take(&self) -> Option<SlotTicket<'_, R, T>> {
        if !self.pending.load(Ordering::Acquire) {
            return None;
        }
        let mut guard = self.state.try_lock()?;
        let request = guard.request.take()?;
        Some(SlotTicket {
            slot: self,
            guard,
            request: Some(request),
        })
    }

    /// Stop serving requests. Completes an installed or half-executed
    /// request with `ManagerError::ShutDown` and hands it back, so the
    /// caller decides where it is dropped. Idempotent.
    pub fn close(&self) -> Option<R> {
        self.closed.store(true, Ordering::Release);
        let mut state = self.state.lock();
        let request = state.request.take();
        if self.pending.load(Ordering::Acquire) {
            state.outcome = Some(Err(ManagerError::ShutDown));
            self.pending.store(false, Ordering::Release);
            self.done.notify_all();
        }
        request
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// True while a caller owns the slot.
    #[cfg(test)]
    fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// True while an installed request awaits execution.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}

/// A request taken by the periodic thread; must be completed.
#[must_use = "the caller blocks until the ticket is completed"]
pub struct SlotTicket<'a, R, T> {
    slot: &'a RequestSlot<R, T>,
    guard: MutexGuard<'a, SlotState<R, T>>,
    request: Option<R>,
}

impl<R, T> SlotTicket<'_, R, T> {
    /// Move the request out for execution.
    pub fn take_request(&mut self) -> Option<R> {
        self.request.take()
    }

    /// Store the outcome and wake the caller.
    pub fn complete(mut self, outcome: Result<T, ManagerError>) {
        self.guard.outcome = Some(outcome);
        self.slot.pending.store(false, Ordering::Release);
        self.slot.done.notify_all();
    }
}
