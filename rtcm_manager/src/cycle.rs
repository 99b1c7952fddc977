//! Periodic update driver: one `ControllerManager::update` per tick.
//!
//! ## RT Setup Sequence
//! 1. `mlockall(MCL_CURRENT | MCL_FUTURE)` to lock all pages.
//! 2. Prefault stack pages.
//! 3. `sched_setaffinity` to pin the configured CPU core.
//! 4. `sched_setscheduler(SCHED_FIFO, priority)`.
//!
//! All four are no-ops without the `rt` feature.
//!
//! ## Cycle Loop
//! With `rt`: absolute-time sleep on `CLOCK_MONOTONIC` for drift-free
//! pacing. Otherwise: `std::thread::sleep` for the remainder of the period.
//! Overruns are counted and logged (rate limited); with `abort_on_overrun`
//! the first one ends the loop with `CycleError::CycleOverrun`.
//!
//! However the loop ends (stop, RT setup failure, overrun abort or panic)
//! the manager is shut down, so no caller stays blocked on a request.

use crate::config::CycleConfig;
use crate::manager::ControllerManager;
use rtcm_common::consts::OVERRUN_LOG_LIMIT;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

// ─── Cycle Statistics ───────────────────────────────────────────────

/// O(1) per-cycle timing statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleStats {
    /// Total cycles executed.
    pub cycle_count: u64,
    /// Last cycle duration [ns].
    pub last_cycle_ns: i64,
    /// Minimum cycle duration [ns].
    pub min_cycle_ns: i64,
    /// Maximum cycle duration [ns].
    pub max_cycle_ns: i64,
    /// Running sum for average computation.
    pub sum_cycle_ns: i64,
    /// Number of overruns detected.
    pub overruns: u64,
    /// Maximum wake-up latency [ns].
    pub max_latency_ns: i64,
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleStats {
    /// Create a new zeroed stats instance.
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            last_cycle_ns: 0,
            min_cycle_ns: i64::MAX,
            max_cycle_ns: 0,
            sum_cycle_ns: 0,
            overruns: 0,
            max_latency_ns: 0,
        }
    }

    /// Record a cycle duration. O(1), no allocation.
    #[inline]
    pub fn record(&mut self, duration_ns: i64, latency_ns: i64) {
        self.cycle_count += 1;
        self.last_cycle_ns = duration_ns;
        self.min_cycle_ns = self.min_cycle_ns.min(duration_ns);
        self.max_cycle_ns = self.max_cycle_ns.max(duration_ns);
        self.sum_cycle_ns = self.sum_cycle_ns.saturating_add(duration_ns);
        self.max_latency_ns = self.max_latency_ns.max(latency_ns);
    }

    /// Average cycle time [ns] (returns 0 if no cycles).
    #[inline]
    pub fn avg_cycle_ns(&self) -> i64 {
        if self.cycle_count == 0 {
            0
        } else {
            self.sum_cycle_ns / self.cycle_count as i64
        }
    }

    /// Count an overrun; true if it should be logged.
    ///
    /// The first [`OVERRUN_LOG_LIMIT`] are logged, then every 1000th.
    #[inline]
    fn note_overrun(&mut self) -> bool {
        self.overruns += 1;
        self.overruns <= OVERRUN_LOG_LIMIT || self.overruns % 1000 == 0
    }
}

// ─── Errors ─────────────────────────────────────────────────────────

/// Errors during RT setup or cycle execution.
#[derive(Debug, Error)]
pub enum CycleError {
    /// RT system call failed.
    #[error("RT setup error: {0}")]
    RtSetup(String),

    /// Cycle exceeded its budget with `abort_on_overrun` set.
    #[error("ERR_CYCLE_OVERRUN: {actual_ns}ns > {budget_ns}ns budget")]
    CycleOverrun { actual_ns: i64, budget_ns: i64 },

    /// The periodic thread could not be spawned.
    #[error("failed to spawn cycle thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// The periodic thread panicked.
    #[error("cycle thread panicked")]
    Panicked,
}

// ─── RT Setup ───────────────────────────────────────────────────────

#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), CycleError> {
    use nix::sys::mman::{MlockallFlags, mlockall};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| CycleError::RtSetup(format!("mlockall failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), CycleError> {
    Ok(())
}

/// Touch 256 KiB of stack so the first ticks do not page-fault.
fn prefault_stack() {
    let mut buf = [0u8; 256 * 1024];
    for byte in buf.iter_mut() {
        // SAFETY: `byte` is a valid, exclusive reference into `buf`.
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), CycleError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| CycleError::RtSetup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| CycleError::RtSetup(format!("sched_setaffinity failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), CycleError> {
    Ok(())
}

#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), CycleError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: `param` outlives the call; pid 0 is the calling thread.
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(CycleError::RtSetup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), CycleError> {
    Ok(())
}

/// Full RT setup for the calling thread.
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), CycleError> {
    rt_mlockall()?;
    prefault_stack();
    rt_set_affinity(cpu_core)?;
    rt_set_scheduler(rt_priority)?;
    Ok(())
}

// ─── Cycle Runner ───────────────────────────────────────────────────

/// Shuts the manager down when the loop exits, unwinding included.
struct ShutdownOnExit(Arc<ControllerManager>);

impl Drop for ShutdownOnExit {
    fn drop(&mut self) {
        self.0.shutdown();
    }
}

/// Drives a shared [`ControllerManager`] at a fixed period until its
/// running flag is cleared.
pub struct CycleRunner {
    manager: Arc<ControllerManager>,
    config: CycleConfig,
    stats: CycleStats,
    running: Arc<AtomicBool>,
    cycle_time_ns: i64,
}

impl CycleRunner {
    pub fn new(manager: Arc<ControllerManager>, config: CycleConfig) -> Self {
        let cycle_time_ns = i64::from(config.cycle_time_us) * 1000;
        Self {
            manager,
            config,
            stats: CycleStats::new(),
            running: Arc::new(AtomicBool::new(true)),
            cycle_time_ns,
        }
    }

    /// Flag that stops the loop when cleared.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    /// Run RT setup and the cycle loop on the current thread.
    ///
    /// Returns the final statistics once the running flag is cleared.
    ///
    /// # Errors
    /// - `CycleError::RtSetup` if any RT system call fails
    /// - `CycleError::CycleOverrun` on the first overrun with
    ///   `abort_on_overrun`
    ///
    /// The manager is shut down on return.
    pub fn run(mut self) -> Result<CycleStats, CycleError> {
        let _shutdown = ShutdownOnExit(Arc::clone(&self.manager));
        rt_setup(self.config.cpu_core, self.config.rt_priority)?;
        info!(
            cycle_time_us = self.config.cycle_time_us,
            rt = cfg!(feature = "rt"),
            "Cycle loop started"
        );

        #[cfg(feature = "rt")]
        self.run_rt_loop()?;

        #[cfg(not(feature = "rt"))]
        self.run_sim_loop()?;

        info!(
            cycles = self.stats.cycle_count,
            overruns = self.stats.overruns,
            avg_ns = self.stats.avg_cycle_ns(),
            max_ns = self.stats.max_cycle_ns,
            "Cycle loop stopped"
        );
        Ok(self.stats)
    }

    /// Run on a new thread named `rtcm-cycle`.
    pub fn spawn(self) -> Result<CycleHandle, CycleError> {
        let running = self.running_flag();
        let join = std::thread::Builder::new()
            .name("rtcm-cycle".to_string())
            .spawn(move || self.run())?;
        Ok(CycleHandle { running, join })
    }

    #[cfg(feature = "rt")]
    fn run_rt_loop(&mut self) -> Result<(), CycleError> {
        use nix::time::{ClockId, ClockNanosleepFlags, clock_gettime, clock_nanosleep};

        let clock = ClockId::CLOCK_MONOTONIC;
        let gettime =
            || clock_gettime(clock).map_err(|e| CycleError::RtSetup(format!("clock_gettime: {e}")));
        let period = self.config.period();
        let mut next_wake = gettime()?;

        while self.running.load(Ordering::Acquire) {
            next_wake = timespec_add_ns(next_wake, self.cycle_time_ns);

            let cycle_start = gettime()?;
            self.manager.update(Instant::now(), period);
            let cycle_end = gettime()?;

            let duration_ns = timespec_diff_ns(&cycle_end, &cycle_start);
            let latency_ns = timespec_diff_ns(&cycle_start, &next_wake).abs();
            self.finish_cycle(duration_ns, latency_ns)?;

            let _ = clock_nanosleep(clock, ClockNanosleepFlags::TIMER_ABSTIME, &next_wake);
        }
        Ok(())
    }

    #[cfg(not(feature = "rt"))]
    fn run_sim_loop(&mut self) -> Result<(), CycleError> {
        let period = self.config.period();
        let mut last_start: Option<Instant> = None;

        while self.running.load(Ordering::Acquire) {
            let cycle_start = Instant::now();
            let latency_ns = last_start
                .map(|prev| {
                    let actual = cycle_start.duration_since(prev).as_nanos() as i64;
                    (actual - self.cycle_time_ns).max(0)
                })
                .unwrap_or(0);
            last_start = Some(cycle_start);

            self.manager.update(cycle_start, period);

            let elapsed = cycle_start.elapsed();
            self.finish_cycle(elapsed.as_nanos() as i64, latency_ns)?;

            if let Some(remaining) = period.checked_sub(elapsed) {
                std::thread::sleep(remaining);
            }
        }
        Ok(())
    }

    fn finish_cycle(&mut self, duration_ns: i64, latency_ns: i64) -> Result<(), CycleError> {
        self.stats.record(duration_ns, latency_ns);
        if duration_ns <= self.cycle_time_ns {
            return Ok(());
        }
        if self.config.abort_on_overrun {
            self.stats.overruns += 1;
            return Err(CycleError::CycleOverrun {
                actual_ns: duration_ns,
                budget_ns: self.cycle_time_ns,
            });
        }
        if self.stats.note_overrun() {
            warn!(
                actual_ns = duration_ns,
                budget_ns = self.cycle_time_ns,
                overruns = self.stats.overruns,
                "Cycle overrun"
            );
        }
        Ok(())
    }
}

/// Handle to a spawned [`CycleRunner`].
pub struct CycleHandle {
    running: Arc<AtomicBool>,
    join: JoinHandle<Result<CycleStats, CycleError>>,
}

impl CycleHandle {
    /// Flag that stops the loop when cleared.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// True while the periodic thread is alive.
    pub fn is_running(&self) -> bool {
        !self.join.is_finished()
    }

    /// Clear the running flag and wait for the loop to exit.
    pub fn stop(self) -> Result<CycleStats, CycleError> {
        self.running.store(false, Ordering::Release);
        self.join.join().map_err(|_| CycleError::Panicked)?
    }
}

// ─── Time Helpers ───────────────────────────────────────────────────

/// Add nanoseconds to a TimeSpec.
#[cfg(feature = "rt")]
fn timespec_add_ns(ts: nix::sys::time::TimeSpec, ns: i64) -> nix::sys::time::TimeSpec {
    use nix::sys::time::TimeSpec;
    let total = ts.tv_nsec() + ns;
    let secs = ts.tv_sec() + total.div_euclid(1_000_000_000);
    let nanos = total.rem_euclid(1_000_000_000);
    TimeSpec::new(secs, nanos)
}

/// Compute the difference (a - b) in nanoseconds.
#[cfg(feature = "rt")]
fn timespec_diff_ns(a: &nix::sys::time::TimeSpec, b: &nix::sys::time::TimeSpec) -> i64 {
    (a.tv_sec() - b.tv_sec()) * 1_000_000_000 + (a.tv_nsec() - b.tv_nsec())
}

// ─── Tests ──────────────────────────────────────────────────────────
