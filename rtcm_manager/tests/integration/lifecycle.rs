//! Integration test: loading, unloading and the controller lifecycle as
//! seen through the manager.

use super::mocks::{Fixture, Journal, MockLoader, Ticker, spec};
use rtcm_common::controller::ControllerSpec;
use rtcm_common::types::{InterfaceKind, LifecycleState, Strictness};
use rtcm_manager::ManagerError;
use std::sync::Arc;
use std::thread;

use LifecycleState::{Initialized, Running, Stopped};

#[test]
fn load_reports_initialized_with_claims() {
    let fx = Fixture::new();
    let _ticker = Ticker::start(&fx.manager);
    fx.load(&["d"]);

    let status = fx.manager.list_controllers();
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].name, "d");
    assert_eq!(status[0].type_name, "Mock");
    assert_eq!(status[0].state, Initialized);
    assert_eq!(status[0].claimed.interface_of("j3"), Some(InterfaceKind::Position));
    assert!(fx.manager.claimed_resources().is_empty());
}

#[test]
fn start_stop_restart() {
    let fx = Fixture::new();
    let _ticker = Ticker::start(&fx.manager);
    fx.load(&["a"]);

    for _ in 0..2 {
        fx.manager
            .switch_controller(&["a"], &[], Strictness::Strict)
            .unwrap();
        assert_eq!(fx.manager.controller_state("a"), Some(Running));
        fx.manager
            .switch_controller(&[], &["a"], Strictness::Strict)
            .unwrap();
        assert_eq!(fx.manager.controller_state("a"), Some(Stopped));
        assert!(fx.manager.claimed_resources().is_empty());
    }
}

#[test]
fn unloaded_instance_is_destroyed_on_caller_thread() {
    let fx = Fixture::new();
    let ticker = Ticker::start(&fx.manager);
    fx.load(&["a", "c"]);
    fx.manager
        .switch_controller(&["a"], &[], Strictness::Strict)
        .unwrap();

    assert_eq!(
        fx.manager.unload_controller("a").unwrap_err(),
        ManagerError::StillRunning("a".into())
    );
    assert!(fx.journal.dropped_on("a").is_none());

    fx.manager.unload_controller("c").unwrap();
    let dropped_on = fx.journal.dropped_on("c").unwrap();
    assert_eq!(dropped_on, thread::current().id());
    assert_ne!(Some(dropped_on), ticker.thread_id());
    assert_eq!(fx.manager.controller_state("c"), None);

    // The name can be loaded again.
    fx.manager.load_controller("c").unwrap();
    assert_eq!(fx.manager.controller_state("c"), Some(Initialized));
}

#[test]
fn unload_errors() {
    let fx = Fixture::new();
    let _ticker = Ticker::start(&fx.manager);
    assert_eq!(
        fx.manager.unload_controller("a").unwrap_err(),
        ManagerError::UnknownController("a".into())
    );
}

#[test]
fn failed_init_leaves_set_unchanged() {
    let fx = Fixture::new();
    let _ticker = Ticker::start(&fx.manager);
    fx.manager
        .set_controller_spec(spec("broken", &["j1"]).with_param("fail_init", true));
    fx.manager.set_controller_spec(spec("bad_joint", &["j9"]));

    let err = fx.manager.load_controller("broken").unwrap_err();
    assert!(matches!(err, ManagerError::ControllerInitFailed { ref name, .. } if name == "broken"));
    let err = fx.manager.load_controller("bad_joint").unwrap_err();
    assert_eq!(err.code(), "ERR_CONTROLLER_INIT_FAILED");

    assert!(fx.manager.list_controllers().is_empty());
    assert_eq!(fx.journal.dropped_on("broken"), Some(thread::current().id()));
}

#[test]
fn duplicate_load_is_rejected() {
    let fx = Fixture::new();
    let _ticker = Ticker::start(&fx.manager);
    fx.load(&["a"]);
    assert_eq!(
        fx.manager.load_controller("a").unwrap_err(),
        ManagerError::AlreadyLoaded("a".into())
    );
    assert_eq!(fx.manager.list_controllers().len(), 1);
}

#[test]
fn loader_resolution() {
    let fx = Fixture::new();
    let _ticker = Ticker::start(&fx.manager);
    let journal = Arc::new(Journal::default());

    let mut hollow = MockLoader::new("hollow", &["Hollow", "Mock"], &journal);
    hollow.empty = true;
    fx.manager.register_controller_loader(Arc::new(hollow));

    assert_eq!(
        fx.manager.list_controller_types(),
        vec!["Hollow".to_string(), "Mock".to_string()]
    );

    // `Mock` is served by the first loader declaring it.
    fx.load(&["a"]);

    fx.manager
        .set_controller_spec(ControllerSpec::new("h", "Hollow"));
    assert_eq!(
        fx.manager.load_controller("h").unwrap_err().code(),
        "ERR_CONTROLLER_INIT_FAILED"
    );

    fx.manager
        .set_controller_spec(ControllerSpec::new("x", "Missing"));
    assert_eq!(
        fx.manager.load_controller("x").unwrap_err(),
        ManagerError::UnknownType("Missing".into())
    );
    assert_eq!(
        fx.manager.load_controller("nobody").unwrap_err(),
        ManagerError::UnknownController("nobody".into())
    );
}

#[test]
fn stop_all_stops_only_running() {
    let fx = Fixture::new();
    let _ticker = Ticker::start(&fx.manager);
    fx.load(&["a", "c", "d"]);
    fx.manager
        .switch_controller(&["a", "c"], &[], Strictness::Strict)
        .unwrap();

    fx.manager.stop_all().unwrap();
    assert_eq!(fx.manager.controller_state("a"), Some(Stopped));
    assert_eq!(fx.manager.controller_state("c"), Some(Stopped));
    assert_eq!(fx.manager.controller_state("d"), Some(Initialized));
    assert!(fx.manager.claimed_resources().is_empty());

    // Nothing running: still succeeds.
    fx.manager.stop_all().unwrap();
}
