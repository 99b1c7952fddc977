//! Integration test: the cycle runner driving the built-in controllers on
//! simulated hardware, configured from a TOML file.

use super::mocks::wait_for;
use rtcm_common::config::ConfigLoader;
use rtcm_common::types::{InterfaceKind, LifecycleState, Strictness};
use rtcm_manager::{ControllerManager, ControllerRegistry, CycleRunner, ManagerConfig, SimHardware};
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

const CONFIG: &str = r#"
[shared]
service_name = "runner-test"

[cycle]
cycle_time_us = 500

[[hardware.joints]]
name = "shoulder"
initial_position = 0.1

[[hardware.joints]]
name = "elbow"

[[controllers]]
name = "state"
type = "JointStateController"
autostart = true
[controllers.params]
publish_rate = 200.0

[[controllers]]
name = "hold"
type = "JointPositionController"
autostart = true
[controllers.params]
joints = ["shoulder", "elbow"]
setpoints = [0.4, -0.2]

[[controllers]]
name = "jog"
type = "JointVelocityController"
[controllers.params]
joints = ["shoulder"]
setpoints = [1.0]
"#;

fn load_config() -> ManagerConfig {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(CONFIG.as_bytes()).unwrap();
    ManagerConfig::load_validated(file.path()).unwrap()
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

#[test]
fn runner_drives_builtin_controllers() {
    let config = load_config();
    let manager = Arc::new(ControllerManager::new(Box::new(SimHardware::new(
        &config.hardware,
    ))));
    manager.register_controller_loader(Arc::new(ControllerRegistry::with_builtin_controllers()));
    for spec in &config.controllers {
        manager.set_controller_spec(spec.clone());
    }
    assert_eq!(manager.hardware_name(), "simulation");

    let cycle = CycleRunner::new(Arc::clone(&manager), config.cycle.clone())
        .spawn()
        .unwrap();

    for spec in &config.controllers {
        manager.load_controller(&spec.name).unwrap();
    }
    let autostart: Vec<&str> = config
        .controllers
        .iter()
        .filter(|s| s.autostart)
        .map(|s| s.name.as_str())
        .collect();
    manager
        .switch_controller(&autostart, &[], Strictness::Strict)
        .unwrap();
    assert_eq!(manager.running_controllers(), vec!["state", "hold"]);

    let shoulder = manager
        .interfaces()
        .get(InterfaceKind::JointState, "shoulder")
        .cloned()
        .unwrap();
    let elbow = manager
        .interfaces()
        .get(InterfaceKind::JointState, "elbow")
        .cloned()
        .unwrap();
    assert!(wait_for(|| close(shoulder.position(), 0.4) && close(elbow.position(), -0.2)));

    // `jog` needs the shoulder: only a swap that stops `hold` is accepted.
    assert_eq!(
        manager
            .switch_controller(&["jog"], &[], Strictness::Strict)
            .unwrap_err()
            .code(),
        "ERR_RESOURCE_CONFLICT"
    );
    manager
        .switch_controller(&["jog"], &["hold"], Strictness::Strict)
        .unwrap();
    assert_eq!(manager.controller_state("hold"), Some(LifecycleState::Stopped));
    assert!(wait_for(|| shoulder.position() > 0.45));

    manager.stop_all().unwrap();
    assert!(manager.running_controllers().is_empty());

    let stats = cycle.stop().unwrap();
    assert!(stats.cycle_count > 0);
    assert_eq!(stats.cycle_count, manager.ticks());
}

#[test]
fn list_types_from_builtin_registry() {
    let config = load_config();
    let manager = ControllerManager::new(Box::new(SimHardware::new(&config.hardware)));
    manager.register_controller_loader(Arc::new(ControllerRegistry::default()));
    assert_eq!(
        manager.list_controller_types(),
        vec![
            "JointPositionController",
            "JointStateController",
            "JointVelocityController"
        ]
    );
}
