//! Instrumented hardware, controllers and loader shared by the tests.

use parking_lot::Mutex;
use rtcm_common::controller::{
    Controller, ControllerError, ControllerLoader, ControllerSpec, InitContext,
};
use rtcm_common::hardware::{HardwareInterfaces, JointHandle, RobotHardware};
use rtcm_common::types::{ClaimedResources, ControllerInfo, InterfaceKind};
use rtcm_manager::ControllerManager;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

pub const PERIOD: Duration = Duration::from_millis(1);

// ── Hardware ────────────────────────────────────────────────────────

/// One hardware hook invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HwCall {
    Check,
    Prepare,
    Switch { stop: Vec<String>, start: Vec<String> },
}

/// Shared view into a [`MockHardware`].
#[derive(Default)]
pub struct Monitor {
    pub veto: AtomicBool,
    pub refuse: AtomicBool,
    pub calls: Mutex<Vec<HwCall>>,
    pub reads: AtomicU64,
    pub writes: AtomicU64,
}

impl Monitor {
    pub fn calls(&self) -> Vec<HwCall> {
        self.calls.lock().clone()
    }

    pub fn switches(&self) -> Vec<(Vec<String>, Vec<String>)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                HwCall::Switch { stop, start } => Some((stop.clone(), start.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

/// Joints `j1`..`j3`, each with state, position and velocity interfaces.
///
/// Every hook is also recorded as a [`Step`] in the shared journal.
pub struct MockHardware {
    monitor: Arc<Monitor>,
    journal: Arc<Journal>,
}

impl MockHardware {
    pub fn new(journal: &Arc<Journal>) -> (Self, Arc<Monitor>) {
        let monitor = Arc::new(Monitor::default());
        (
            Self {
                monitor: Arc::clone(&monitor),
                journal: Arc::clone(journal),
            },
            monitor,
        )
    }

    fn call(&self, call: HwCall) {
        self.monitor.calls.lock().push(call.clone());
        self.journal.record(Step::Hw(call));
    }
}

fn names(infos: &[ControllerInfo]) -> Vec<String> {
    infos.iter().map(|i| i.name.clone()).collect()
}

impl RobotHardware for MockHardware {
    fn name(&self) -> &str {
        "mock"
    }

    fn interfaces(&self) -> HardwareInterfaces {
        let mut hw = HardwareInterfaces::new();
        for name in ["j1", "j2", "j3"] {
            let handle = JointHandle::new(name);
            hw.register(InterfaceKind::JointState, handle.clone());
            hw.register(InterfaceKind::Position, handle.clone());
            hw.register(InterfaceKind::Velocity, handle);
        }
        hw
    }

    fn check_for_conflict(&self, _stop: &[ControllerInfo], _start: &[ControllerInfo]) -> bool {
        self.call(HwCall::Check);
        self.monitor.veto.load(Ordering::SeqCst)
    }

    fn prepare_switch(&mut self, _stop: &[ControllerInfo], _start: &[ControllerInfo]) -> bool {
        self.call(HwCall::Prepare);
        !self.monitor.refuse.load(Ordering::SeqCst)
    }

    fn do_switch(&mut self, stop: &[ControllerInfo], start: &[ControllerInfo]) {
        self.call(HwCall::Switch {
            stop: names(stop),
            start: names(start),
        });
    }

    fn read(&mut self, _now: Instant, _period: Duration) {
        self.monitor.reads.fetch_add(1, Ordering::SeqCst);
        self.journal.record(Step::Read);
    }

    fn write(&mut self, _now: Instant, _period: Duration) {
        self.monitor.writes.fetch_add(1, Ordering::SeqCst);
        self.journal.record(Step::Write);
    }
}

// ── Controllers ─────────────────────────────────────────────────────

/// One hardware or controller hook, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Hw(HwCall),
    Read,
    Write,
    Starting(String),
    Stopping(String),
    Update(String),
}

/// Shared record of hardware and controller activity.
#[derive(Default)]
pub struct Journal {
    /// Every hook, hardware and controllers interleaved.
    pub steps: Mutex<Vec<Step>>,
    /// (controller, thread) for every dropped instance.
    pub drops: Mutex<Vec<(String, ThreadId)>>,
    /// Total `update` calls across all instances.
    pub updates: AtomicU64,
}

impl Journal {
    pub fn record(&self, step: Step) {
        self.steps.lock().push(step);
    }

    pub fn steps(&self) -> Vec<Step> {
        self.steps.lock().clone()
    }

    /// Only `Starting` and `Stopping` steps.
    pub fn transitions(&self) -> Vec<Step> {
        self.steps
            .lock()
            .iter()
            .filter(|s| matches!(s, Step::Starting(_) | Step::Stopping(_)))
            .cloned()
            .collect()
    }

    pub fn clear_steps(&self) {
        self.steps.lock().clear();
    }

    pub fn dropped_on(&self, name: &str) -> Option<ThreadId> {
        self.drops
            .lock()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| *t)
    }
}

/// Claims `Position` on the joints listed in `joints`.
///
/// Boolean params `fail_init`, `fail_starting`, `fail_update` and
/// `fail_stopping` make the matching hook return an error;
/// `panic_update` makes `update` panic.
pub struct MockController {
    journal: Arc<Journal>,
    name: String,
    fail_starting: bool,
    fail_update: bool,
    fail_stopping: bool,
    panic_update: bool,
}

fn flag(ctx: &InitContext<'_>, key: &str) -> bool {
    ctx.params()
        .get(key)
        .and_then(toml::Value::as_bool)
        .unwrap_or(false)
}

impl Controller for MockController {
    fn init_request(
        &mut self,
        ctx: &InitContext<'_>,
        claimed: &mut ClaimedResources,
    ) -> Result<(), ControllerError> {
        self.name = ctx.name().to_string();
        if flag(ctx, "fail_init") {
            return Err(ControllerError::Fault("init refused".into()));
        }
        for joint in ctx.str_list_param("joints")?.unwrap_or_default() {
            ctx.claim(InterfaceKind::Position, &joint, claimed)?;
        }
        self.fail_starting = flag(ctx, "fail_starting");
        self.fail_update = flag(ctx, "fail_update");
        self.fail_stopping = flag(ctx, "fail_stopping");
        self.panic_update = flag(ctx, "panic_update");
        Ok(())
    }

    fn starting(&mut self, _now: Instant) -> Result<(), ControllerError> {
        self.journal.record(Step::Starting(self.name.clone()));
        if self.fail_starting {
            return Err(ControllerError::Fault("cannot start".into()));
        }
        Ok(())
    }

    fn update(&mut self, _now: Instant, _period: Duration) -> Result<(), ControllerError> {
        self.journal.updates.fetch_add(1, Ordering::SeqCst);
        self.journal.record(Step::Update(self.name.clone()));
        if self.panic_update {
            panic!("{} blew up in update", self.name);
        }
        if self.fail_update {
            return Err(ControllerError::Fault("diverged".into()));
        }
        Ok(())
    }

    fn stopping(&mut self, _now: Instant) -> Result<(), ControllerError> {
        self.journal.record(Step::Stopping(self.name.clone()));
        if self.fail_stopping {
            return Err(ControllerError::Fault("brake failure".into()));
        }
        Ok(())
    }
}

impl Drop for MockController {
    fn drop(&mut self) {
        self.journal
            .drops
            .lock()
            .push((self.name.clone(), thread::current().id()));
    }
}

/// Declares `types`; creates a [`MockController`] for each, or nothing
/// when `empty` is set.
pub struct MockLoader {
    pub name: String,
    pub types: Vec<String>,
    pub empty: bool,
    pub journal: Arc<Journal>,
}

impl MockLoader {
    pub fn new(name: &str, types: &[&str], journal: &Arc<Journal>) -> Self {
        Self {
            name: name.to_string(),
            types: types.iter().map(|t| t.to_string()).collect(),
            empty: false,
            journal: Arc::clone(journal),
        }
    }
}

impl ControllerLoader for MockLoader {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_instance(&self, type_name: &str) -> Option<Box<dyn Controller>> {
        if self.empty || !self.types.iter().any(|t| t == type_name) {
            return None;
        }
        Some(Box::new(MockController {
            journal: Arc::clone(&self.journal),
            name: String::new(),
            fail_starting: false,
            fail_update: false,
            fail_stopping: false,
            panic_update: false,
        }))
    }

    fn declared_classes(&self) -> Vec<String> {
        self.types.clone()
    }
}

// ── Fixture ─────────────────────────────────────────────────────────

/// Spec for a `Mock` controller claiming `joints`.
pub fn spec(name: &str, joints: &[&str]) -> ControllerSpec {
    ControllerSpec::new(name, "Mock").with_param(
        "joints",
        toml::Value::Array(joints.iter().map(|j| toml::Value::from(*j)).collect()),
    )
}

pub struct Fixture {
    pub manager: Arc<ControllerManager>,
    pub monitor: Arc<Monitor>,
    pub journal: Arc<Journal>,
}

impl Fixture {
    /// Manager over [`MockHardware`] with the `Mock` type registered and
    /// specs `a` (j1), `b` (j1), `c` (j2), `d` (j1, j3).
    pub fn new() -> Self {
        let journal = Arc::new(Journal::default());
        let (hardware, monitor) = MockHardware::new(&journal);
        let manager = Arc::new(ControllerManager::new(Box::new(hardware)));
        manager.register_controller_loader(Arc::new(MockLoader::new("mock", &["Mock"], &journal)));
        manager.set_controller_spec(spec("a", &["j1"]));
        manager.set_controller_spec(spec("b", &["j1"]));
        manager.set_controller_spec(spec("c", &["j2"]));
        manager.set_controller_spec(spec("d", &["j1", "j3"]));
        Self {
            manager,
            monitor,
            journal,
        }
    }

    /// Load every name; needs a running [`Ticker`].
    pub fn load(&self, names: &[&str]) {
        for name in names {
            self.manager.load_controller(name).unwrap();
        }
    }

    pub fn holder(&self, resource: &str) -> Option<String> {
        self.manager.claimed_resources().get(resource).cloned()
    }
}

/// Ticks a manager on a background thread until dropped.
pub struct Ticker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    pub fn start(manager: &Arc<ControllerManager>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let manager = Arc::clone(manager);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    manager.update(Instant::now(), PERIOD);
                    thread::sleep(Duration::from_micros(200));
                }
            })
        };
        Self {
            stop,
            handle: Some(handle),
        }
    }

    pub fn thread_id(&self) -> Option<ThreadId> {
        self.handle.as_ref().map(|h| h.thread().id())
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Poll `cond` for up to two seconds.
pub fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_micros(200));
    }
    cond()
}
