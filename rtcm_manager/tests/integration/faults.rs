//! Integration test: controller faults in `starting`, `update` and
//! `stopping`.
//!
//! A failing controller is forced to `Stopped` and loses its claims; the
//! rest of the switch (or tick) proceeds.

use super::mocks::{Fixture, PERIOD, Ticker, spec, wait_for};
use rtcm_common::types::{LifecycleState, Strictness};
use rtcm_manager::{FaultPhase, ManagerError};
use std::sync::atomic::Ordering;
use std::time::Instant;

use LifecycleState::{Running, Stopped};

#[test]
fn starting_fault_does_not_block_other_starters() {
    let fx = Fixture::new();
    let _ticker = Ticker::start(&fx.manager);
    fx.manager
        .set_controller_spec(spec("flaky", &["j3"]).with_param("fail_starting", true));
    fx.load(&["flaky", "c"]);
    fx.monitor.clear();

    let err = fx
        .manager
        .switch_controller(&["flaky", "c"], &[], Strictness::Strict)
        .unwrap_err();
    match err {
        ManagerError::RuntimeFault { name, phase, .. } => {
            assert_eq!(name, "flaky");
            assert_eq!(phase, FaultPhase::Starting);
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(fx.manager.controller_state("flaky"), Some(Stopped));
    assert_eq!(fx.manager.controller_state("c"), Some(Running));
    assert_eq!(fx.holder("j3"), None);
    assert_eq!(fx.holder("j2").as_deref(), Some("c"));
    assert_eq!(
        fx.monitor.switches(),
        vec![(Vec::<String>::new(), vec!["c".to_string()])]
    );

    let faults = fx.manager.faults();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].controller, "flaky");
    assert_eq!(faults[0].phase, FaultPhase::Starting);
}

#[test]
fn update_fault_stops_only_the_faulty_controller() {
    let fx = Fixture::new();
    let _ticker = Ticker::start(&fx.manager);
    fx.manager
        .set_controller_spec(spec("diverging", &["j3"]).with_param("fail_update", true));
    fx.load(&["diverging", "a"]);
    fx.manager
        .switch_controller(&["diverging", "a"], &[], Strictness::Strict)
        .unwrap();

    assert!(wait_for(|| !fx.manager.faults().is_empty()));
    assert_eq!(fx.manager.controller_state("diverging"), Some(Stopped));
    assert_eq!(fx.manager.faults()[0].phase, FaultPhase::Update);
    assert_eq!(fx.holder("j3"), None);

    // The healthy controller keeps being updated.
    let updates = fx.journal.updates.load(Ordering::SeqCst);
    assert!(wait_for(|| fx.journal.updates.load(Ordering::SeqCst) > updates + 3));
    assert_eq!(fx.manager.controller_state("a"), Some(Running));
    assert_eq!(fx.holder("j1").as_deref(), Some("a"));

    // A faulted controller can be started again.
    fx.manager
        .switch_controller(&["diverging"], &[], Strictness::Strict)
        .unwrap();
}

#[test]
fn update_fault_is_recorded_once() {
    let fx = Fixture::new();
    fx.manager
        .set_controller_spec(spec("diverging", &["j1"]).with_param("fail_update", true));
    {
        let _ticker = Ticker::start(&fx.manager);
        fx.load(&["diverging"]);
        fx.manager
            .switch_controller(&["diverging"], &[], Strictness::Strict)
            .unwrap();
    }
    // Stopped by the fault: further ticks record nothing.
    fx.manager.update(Instant::now(), PERIOD);
    fx.manager.update(Instant::now(), PERIOD);

    let faults = fx.manager.faults();
    assert_eq!(faults.len(), 1);
    assert!(faults[0].tick >= 1);
    assert!(faults[0].message.contains("diverged"));
    assert!(fx.manager.running_controllers().is_empty());
    assert!(fx.manager.claimed_resources().is_empty());
}

#[test]
fn stopping_fault_still_stops_and_releases() {
    let fx = Fixture::new();
    let _ticker = Ticker::start(&fx.manager);
    fx.manager
        .set_controller_spec(spec("sticky", &["j1"]).with_param("fail_stopping", true));
    fx.load(&["sticky", "b"]);
    fx.manager
        .switch_controller(&["sticky"], &[], Strictness::Strict)
        .unwrap();

    let err = fx
        .manager
        .switch_controller(&["b"], &["sticky"], Strictness::Strict)
        .unwrap_err();
    assert!(matches!(
        err,
        ManagerError::RuntimeFault {
            phase: FaultPhase::Stopping,
            ..
        }
    ));
    assert_eq!(fx.manager.controller_state("sticky"), Some(Stopped));
    assert_eq!(fx.manager.controller_state("b"), Some(Running));
    assert_eq!(fx.holder("j1").as_deref(), Some("b"));
}

#[test]
fn status_report_serializes_faults() {
    let fx = Fixture::new();
    let _ticker = Ticker::start(&fx.manager);
    fx.manager
        .set_controller_spec(spec("flaky", &["j2"]).with_param("fail_starting", true));
    fx.load(&["flaky"]);
    let _ = fx
        .manager
        .switch_controller(&["flaky"], &[], Strictness::BestEffort);

    let json = serde_json::to_value(fx.manager.status_report()).unwrap();
    assert_eq!(json["controllers"][0]["name"], "flaky");
    assert_eq!(json["controllers"][0]["state"], "stopped");
    assert_eq!(json["faults"][0]["phase"], "starting");
    assert_eq!(json["pending_request"], false);
}
