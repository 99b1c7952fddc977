//! Controller manager: loading, switching and the periodic tick.
//!
//! # Threads
//!
//! - **Callers** (`load_controller`, `unload_controller`,
//!   `switch_controller`, `stop_all`) validate on their own thread against
//!   the published [`ManagerView`], hand the request over through the
//!   [`RequestSlot`] and block until the periodic thread has executed it.
//! - **Periodic thread** (`update`) owns the controller set, the claim
//!   registry and the hardware. It never blocks on a caller.
//!
//! # Tick
//!
//! 1. Execute a pending request, if any, exactly once; publish the view;
//!    wake the caller
//! 2. `hardware.read()`
//! 3. `update()` on every running controller, in registration order
//! 4. `hardware.write()`
//!
//! A controller failing in step 3 is forced to `Stopped`, its claims are
//! released, the fault is logged and published; the tick continues.
//!
//! # Shutdown
//!
//! Whoever drives `update` calls [`ControllerManager::shutdown`] when it
//! stops for good. A request waiting at that point, and every later one,
//! fails with `ManagerError::ShutDown` instead of blocking.

use crate::claims::ClaimRegistry;
use crate::error::ManagerError;
use crate::instance::ControllerInstance;
use crate::set::ControllerSet;
use crate::slot::RequestSlot;
use crate::status::{ControllerFault, ControllerStatus, FaultPhase, ManagerView, StatusReport};
use crate::switch::{SwitchPlan, SwitchRequest, validate};
use parking_lot::{Mutex, RwLock};
use rtcm_common::controller::{Controller, ControllerError, ControllerLoader, ControllerSpec};
use rtcm_common::hardware::{HardwareInterfaces, RobotHardware};
use rtcm_common::types::{ControllerInfo, LifecycleState, Strictness};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Work handed from a caller to the periodic thread.
enum Request {
    Switch(SwitchPlan),
    Load(Box<ControllerInstance>),
    Unload(String),
}

/// Successful outcome of a request.
enum Completion {
    Done,
    /// Removed instance, dropped by the caller.
    Unloaded(Box<ControllerInstance>),
    /// Load refused at commit time; the instance goes back to the caller.
    Rejected(Box<ControllerInstance>, ManagerError),
}

/// State owned by the periodic thread.
struct Engine {
    hardware: Box<dyn RobotHardware>,
    controllers: ControllerSet,
    claims: ClaimRegistry,
    /// Faults not yet published.
    faults: Vec<ControllerFault>,
}

impl Engine {
    fn execute(&mut self, request: Request, now: Instant, tick: u64) -> Result<Completion, ManagerError> {
        match request {
            Request::Switch(plan) => self.apply_switch(plan, now, tick),
            Request::Load(instance) => {
                let name = instance.name().to_string();
                match self.controllers.insert(*instance) {
                    Ok(()) => {
                        info!(controller = %name, loaded = self.controllers.len(), "Controller loaded");
                        Ok(Completion::Done)
                    }
                    Err(instance) => Ok(Completion::Rejected(
                        Box::new(instance),
                        ManagerError::AlreadyLoaded(name),
                    )),
                }
            }
            Request::Unload(name) => {
                let state = self
                    .controllers
                    .get(&name)
                    .map(ControllerInstance::state)
                    .ok_or_else(|| ManagerError::UnknownController(name.clone()))?;
                if state.is_running() {
                    return Err(ManagerError::StillRunning(name));
                }
                let instance = self
                    .controllers
                    .remove(&name)
                    .ok_or_else(|| ManagerError::UnknownController(name.clone()))?;
                self.claims.release(&name);
                info!(controller = %name, "Controller unloaded");
                Ok(Completion::Unloaded(Box::new(instance)))
            }
        }
    }

    /// Claim check, hardware handshake and commit of one switch.
    fn apply_switch(&mut self, plan: SwitchPlan, now: Instant, tick: u64) -> Result<Completion, ManagerError> {
        let Engine {
            hardware,
            controllers,
            claims,
            faults,
        } = self;

        // States may have changed since the caller validated.
        let plan = validate(&plan.to_request(), |name| {
            controllers.get(name).map(|c| (c.state(), c.claimed()))
        })?;
        let strictness = plan.strictness;
        let infos = |names: &[String]| -> Vec<ControllerInfo> {
            names
                .iter()
                .filter_map(|n| controllers.get(n))
                .map(|c| c.info().clone())
                .collect()
        };
        let stop = infos(&plan.stop);
        let mut start = infos(&plan.start);

        let mut reservation = loop {
            match claims.reserve(&stop, &start) {
                Ok(reservation) => break reservation,
                Err(conflict) if strictness == Strictness::BestEffort => {
                    warn!(%conflict, dropped = %conflict.requested_by, "Dropping starter with claim conflict");
                    start.retain(|s| s.name != conflict.requested_by);
                }
                Err(conflict) => return Err(ManagerError::ResourceConflict(conflict.to_string())),
            }
        };
        debug!(acquire = ?reservation.acquired().collect::<Vec<_>>(), "Claims reserved");

        if hardware.check_for_conflict(&stop, &start) {
            warn!(hardware = hardware.name(), "Hardware vetoed switch");
            return Err(ManagerError::ResourceConflict(format!(
                "hardware '{}' reported a conflict",
                hardware.name()
            )));
        }
        if !hardware.prepare_switch(&stop, &start) {
            warn!(hardware = hardware.name(), "Hardware refused to prepare switch");
            return Err(ManagerError::PrepareFailed);
        }

        let mut first_fault = None;
        for info in &stop {
            let Some(instance) = controllers.get_mut(&info.name) else {
                continue;
            };
            if let Err(e) = instance.stop(now) {
                let fault = record_fault(faults, &info.name, FaultPhase::Stopping, e, tick);
                first_fault.get_or_insert(fault);
            }
        }

        let mut started = Vec::with_capacity(start.len());
        for info in start {
            let Some(instance) = controllers.get_mut(&info.name) else {
                continue;
            };
            match instance.start(now) {
                Ok(()) => started.push(info),
                Err(e) => {
                    reservation.forfeit(&info.name);
                    let fault = record_fault(faults, &info.name, FaultPhase::Starting, e, tick);
                    first_fault.get_or_insert(fault);
                }
            }
        }

        claims.commit(reservation);
        hardware.do_switch(&stop, &started);

        info!(
            started = ?started.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            stopped = ?stop.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            running = ?controllers.running().collect::<Vec<_>>(),
            "Controller switch committed"
        );

        match first_fault {
            Some(fault) => Err(fault),
            None => Ok(Completion::Done),
        }
    }
}

fn record_fault(
    faults: &mut Vec<ControllerFault>,
    controller: &str,
    phase: FaultPhase,
    source: ControllerError,
    tick: u64,
) -> ManagerError {
    error!(controller, %phase, error = %source, "Controller fault, forced to stopped");
    faults.push(ControllerFault {
        controller: controller.to_string(),
        phase,
        message: source.to_string(),
        tick,
    });
    ManagerError::RuntimeFault {
        name: controller.to_string(),
        phase,
        source,
    }
}

/// Owner of the controller set and the hardware; shared between the
/// periodic thread and any number of caller threads.
pub struct ControllerManager {
    engine: Mutex<Engine>,
    interfaces: HardwareInterfaces,
    hardware_name: String,
    loaders: RwLock<Vec<Arc<dyn ControllerLoader>>>,
    specs: RwLock<BTreeMap<String, ControllerSpec>>,
    slot: RequestSlot<Request, Completion>,
    view: RwLock<ManagerView>,
    ticks: AtomicU64,
}

impl ControllerManager {
    /// Manager driving `hardware`; no controllers, no loaders.
    pub fn new(hardware: Box<dyn RobotHardware>) -> Self {
        let interfaces = hardware.interfaces();
        let hardware_name = hardware.name().to_string();
        info!(
            hardware = %hardware_name,
            resources = interfaces.len(),
            "Controller manager created"
        );
        Self {
            engine: Mutex::new(Engine {
                hardware,
                controllers: ControllerSet::new(),
                claims: ClaimRegistry::new(),
                faults: Vec::with_capacity(8),
            }),
            interfaces,
            hardware_name,
            loaders: RwLock::new(Vec::new()),
            specs: RwLock::new(BTreeMap::new()),
            slot: RequestSlot::new(),
            view: RwLock::new(ManagerView::default()),
            ticks: AtomicU64::new(0),
        }
    }

    // ─── Loaders & Specs ────────────────────────────────────────────

    /// Add a source of controller instances. Earlier loaders win.
    pub fn register_controller_loader(&self, loader: Arc<dyn ControllerLoader>) {
        info!(loader = loader.name(), "Controller loader registered");
        self.loaders.write().push(loader);
    }

    /// Every type any registered loader declares, sorted and deduplicated.
    pub fn list_controller_types(&self) -> Vec<String> {
        self.loaders
            .read()
            .iter()
            .flat_map(|l| l.declared_classes())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Register (or replace) the spec `load_controller(spec.name)` uses.
    pub fn set_controller_spec(&self, spec: ControllerSpec) -> Option<ControllerSpec> {
        self.specs.write().insert(spec.name.clone(), spec)
    }

    /// Registered spec for `name`.
    pub fn controller_spec(&self, name: &str) -> Option<ControllerSpec> {
        self.specs.read().get(name).cloned()
    }

    // ─── Requests ───────────────────────────────────────────────────

    /// Instantiate and initialize controller `name` from its spec, then
    /// add it to the set as `Initialized`.
    ///
    /// Instantiation and `init_request` run on the calling thread.
    ///
    /// # Errors
    /// - `ManagerError::AlreadyPending` if another request is in flight
    /// - `ManagerError::ShutDown` once the periodic thread has stopped
    /// - `ManagerError::AlreadyLoaded` if `name` is in the set
    /// - `ManagerError::UnknownController` if no spec is registered
    /// - `ManagerError::UnknownType` if no loader declares the spec's type
    /// - `ManagerError::ControllerInitFailed` if the loader returned nothing
    ///   or `init_request` failed
    pub fn load_controller(&self, name: &str) -> Result<(), ManagerError> {
        let completion = self.slot.submit(|| {
            if self.view.read().controller(name).is_some() {
                return Err(ManagerError::AlreadyLoaded(name.to_string()));
            }
            let spec = self
                .controller_spec(name)
                .ok_or_else(|| ManagerError::UnknownController(name.to_string()))?;
            let algorithm = self.instantiate(&spec)?;

            let mut instance = ControllerInstance::new(&spec.name, &spec.type_name, algorithm);
            instance.init_request(&self.interfaces, &spec.params)?;
            debug!(controller = %name, claims = ?instance.claimed(), "Controller initialized");
            Ok(Request::Load(Box::new(instance)))
        })?;
        finish(completion)
    }

    /// Remove a non-running controller and destroy it on this thread.
    ///
    /// # Errors
    /// - `ManagerError::AlreadyPending` if another request is in flight
    /// - `ManagerError::ShutDown` once the periodic thread has stopped
    /// - `ManagerError::UnknownController` if `name` is not loaded
    /// - `ManagerError::StillRunning` if it is running
    pub fn unload_controller(&self, name: &str) -> Result<(), ManagerError> {
        let completion = self.slot.submit(|| {
            let view = self.view.read();
            let status = view
                .controller(name)
                .ok_or_else(|| ManagerError::UnknownController(name.to_string()))?;
            if status.state.is_running() {
                return Err(ManagerError::StillRunning(name.to_string()));
            }
            Ok(Request::Unload(name.to_string()))
        })?;
        finish(completion)
    }

    /// Start and stop controllers in one atomic step at the next tick.
    ///
    /// # Errors
    /// See [`ControllerManager::switch`].
    pub fn switch_controller(
        &self,
        start: &[&str],
        stop: &[&str],
        strictness: Strictness,
    ) -> Result<(), ManagerError> {
        self.switch(&SwitchRequest::from_lists(start, stop, strictness))
    }

    /// Validate `request`, hand it to the periodic thread and wait for the
    /// outcome.
    ///
    /// A request that validation reduces to nothing still runs the hardware
    /// handshake with empty lists.
    ///
    /// # Errors
    /// - `ManagerError::AlreadyPending` if another request is in flight
    /// - `ManagerError::ShutDown` once the periodic thread has stopped
    /// - `ManagerError::UnknownController` / `ManagerError::ConflictingRequest`
    ///   from validation (`Strict` only)
    /// - `ManagerError::ResourceConflict` if a starter's resource is held by
    ///   a controller that keeps running (`Strict` only), or the hardware
    ///   reported a conflict
    /// - `ManagerError::PrepareFailed` if the hardware refused
    /// - `ManagerError::RuntimeFault` for the first `starting`/`stopping`
    ///   failure; the rest of the switch is still committed
    pub fn switch(&self, request: &SwitchRequest) -> Result<(), ManagerError> {
        debug!(
            start = ?request.start,
            stop = ?request.stop,
            strictness = ?request.strictness,
            "Switch requested"
        );
        let completion = self.slot.submit(|| {
            let view = self.view.read();
            let plan = validate(request, |name| {
                view.controller(name).map(|c| (c.state, &c.claimed))
            })?;
            if plan.is_empty() {
                debug!("Nothing left to switch; running empty handshake");
            }
            Ok(Request::Switch(plan))
        })?;
        finish(completion)
    }

    /// Stop every running controller.
    pub fn stop_all(&self) -> Result<(), ManagerError> {
        let running: Vec<String> = self
            .view
            .read()
            .controllers
            .iter()
            .filter(|c| c.state.is_running())
            .map(|c| c.name.clone())
            .collect();
        let mut request = SwitchRequest::new(Strictness::BestEffort);
        request.stop = running;
        self.switch(&request)
    }

    /// Stop serving requests; called once the periodic thread has exited.
    ///
    /// A caller blocked in a request wakes with `ManagerError::ShutDown`.
    /// Later requests fail with the same error without blocking. Ticks run
    /// through `update` afterwards still read, update and write.
    pub fn shutdown(&self) {
        if self.slot.is_closed() {
            return;
        }
        if let Some(request) = self.slot.close() {
            warn!("Pending request cancelled by shutdown");
            drop(request);
        }
        info!("Controller manager no longer accepts requests");
    }

    /// True once [`ControllerManager::shutdown`] has run.
    pub fn is_shut_down(&self) -> bool {
        self.slot.is_closed()
    }

    // ─── Periodic Tick ──────────────────────────────────────────────

    /// Run one tick. Never fails; faults are logged and published.
    pub fn update(&self, now: Instant, period: Duration) {
        let mut engine = self.engine.lock();
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;

        if let Some(mut ticket) = self.slot.try_take() {
            let outcome = match ticket.take_request() {
                Some(request) => engine.execute(request, now, tick),
                None => Ok(Completion::Done),
            };
            self.publish(&mut engine);
            ticket.complete(outcome);
        }

        let Engine {
            hardware,
            controllers,
            claims,
            faults,
        } = &mut *engine;

        hardware.read(now, period);
        for instance in controllers.iter_mut() {
            if let Err(e) = instance.update(now, period) {
                claims.release(instance.name());
                record_fault(faults, instance.name(), FaultPhase::Update, e, tick);
            }
        }
        hardware.write(now, period);

        if !engine.faults.is_empty() {
            self.publish(&mut engine);
        }
    }

    fn publish(&self, engine: &mut Engine) {
        let mut view = self.view.write();
        view.controllers = engine.controllers.snapshot();
        view.claims.clone_from(engine.claims.claims());
        for fault in engine.faults.drain(..) {
            view.record_fault(fault);
        }
    }

    fn instantiate(&self, spec: &ControllerSpec) -> Result<Box<dyn Controller>, ManagerError> {
        let loaders = self.loaders.read();
        let loader = loaders
            .iter()
            .find(|l| l.declared_classes().iter().any(|t| t == &spec.type_name))
            .ok_or_else(|| ManagerError::UnknownType(spec.type_name.clone()))?;
        loader
            .create_instance(&spec.type_name)
            .ok_or_else(|| ManagerError::ControllerInitFailed {
                name: spec.name.clone(),
                reason: format!(
                    "loader '{}' returned no instance of '{}'",
                    loader.name(),
                    spec.type_name
                ),
            })
    }

    // ─── Introspection ──────────────────────────────────────────────

    /// Snapshot of every loaded controller, in registration order.
    pub fn list_controllers(&self) -> Vec<ControllerStatus> {
        self.view.read().controllers.clone()
    }

    pub fn controller_state(&self, name: &str) -> Option<LifecycleState> {
        self.view.read().controller(name).map(|c| c.state)
    }

    /// Resource → holding controller.
    pub fn claimed_resources(&self) -> BTreeMap<String, String> {
        self.view.read().claims.clone()
    }

    /// Recent runtime faults, oldest first.
    pub fn faults(&self) -> Vec<ControllerFault> {
        self.view.read().faults.iter().cloned().collect()
    }

    /// Names of running controllers, in registration order.
    pub fn running_controllers(&self) -> Vec<String> {
        self.view
            .read()
            .controllers
            .iter()
            .filter(|c| c.state.is_running())
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn has_pending_request(&self) -> bool {
        self.slot.is_pending()
    }

    /// Ticks executed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn interfaces(&self) -> &HardwareInterfaces {
        &self.interfaces
    }

    pub fn hardware_name(&self) -> &str {
        &self.hardware_name
    }

    /// Everything above in one serializable document.
    pub fn status_report(&self) -> StatusReport {
        let view = self.view.read();
        StatusReport {
            ticks: self.ticks(),
            pending_request: self.has_pending_request(),
            controllers: view.controllers.clone(),
            claims: view.claims.clone(),
            faults: view.faults.iter().cloned().collect(),
        }
    }
}

/// Turn a completion into the caller's result; unloaded or rejected
/// instances are dropped here, on the caller's thread.
fn finish(completion: Completion) -> Result<(), ManagerError> {
    match completion {
        Completion::Done => Ok(()),
        Completion::Unloaded(instance) => {
            debug!(controller = instance.name(), "Destroying unloaded controller");
            drop(instance);
            Ok(())
        }
        Completion::Rejected(instance, err) => {
            drop(instance);
            Err(err)
        }
    }
}
