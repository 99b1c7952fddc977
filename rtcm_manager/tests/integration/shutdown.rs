//! Integration test: requests once the cycle thread has exited.
//!
//! Nothing serves the request slot any more, so every request must fail
//! with `ERR_SHUT_DOWN` instead of blocking.

use super::mocks::{Fixture, spec, wait_for};
use rtcm_common::types::{LifecycleState, Strictness};
use rtcm_manager::{CycleConfig, CycleError, CycleRunner, ManagerError};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Run `request` on another thread; `None` if it is still blocked after
/// two seconds.
fn within_deadline<F>(request: F) -> Option<Result<(), ManagerError>>
where
    F: FnOnce() -> Result<(), ManagerError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(request());
    });
    rx.recv_timeout(Duration::from_secs(2)).ok()
}

#[test]
fn requests_fail_after_cycle_stops() {
    let fx = Fixture::new();
    let cycle = CycleRunner::new(Arc::clone(&fx.manager), CycleConfig::default())
        .spawn()
        .unwrap();
    fx.load(&["a"]);
    fx.manager
        .switch_controller(&["a"], &[], Strictness::Strict)
        .unwrap();
    cycle.stop().unwrap();
    assert!(fx.manager.is_shut_down());

    let manager = Arc::clone(&fx.manager);
    assert_eq!(
        within_deadline(move || manager.load_controller("c")),
        Some(Err(ManagerError::ShutDown))
    );
    let manager = Arc::clone(&fx.manager);
    assert_eq!(
        within_deadline(move || manager.stop_all()),
        Some(Err(ManagerError::ShutDown))
    );
    assert_eq!(fx.manager.controller_state("a"), Some(LifecycleState::Running));
    assert!(!fx.manager.has_pending_request());
}

#[test]
fn panicking_cycle_releases_callers() {
    let fx = Fixture::new();
    fx.manager
        .set_controller_spec(spec("bomb", &["j2"]).with_param("panic_update", true));
    let cycle = CycleRunner::new(Arc::clone(&fx.manager), CycleConfig::default())
        .spawn()
        .unwrap();
    fx.load(&["bomb", "a"]);

    // The switch completes before the first update panics.
    fx.manager
        .switch_controller(&["bomb"], &[], Strictness::Strict)
        .unwrap();
    assert!(wait_for(|| fx.manager.is_shut_down()));
    assert!(wait_for(|| !cycle.is_running()));

    let manager = Arc::clone(&fx.manager);
    assert_eq!(
        within_deadline(move || manager.switch_controller(&["a"], &[], Strictness::Strict)),
        Some(Err(ManagerError::ShutDown))
    );
    assert!(matches!(cycle.stop(), Err(CycleError::Panicked)));
}
