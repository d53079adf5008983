//! Sleep/wake orchestration shared between firmware and host targets.
//!
//! The orchestrator owns the pieces a sleep attempt touches: the rail
//! controller, the wake timer, the watchdog guard, the adapter registry,
//! and the event recorder. Hardware is reached through the [`Platform`]
//! capability bundle, so firmware and the emulator plug in the same state
//! machine over different register implementations.
//!
//! A sleep attempt runs inside a critical section from the first check to
//! the halt instruction; an interrupt that fires in between is observed by
//! the pending-interrupt recheck rather than racing the decision.

use crate::adapters::{AdapterHandle, AdapterRegistry, PowerAdapter, RegistryFull, SleepBarrier};
use crate::rails::{
    ALL_RAILS, MaxLoad, PowerState, RailConfig, RailController, RailError, RailHw, RailId,
    StatusProbe, VoltageLevel,
};
use crate::telemetry::PowerRecorder;
use crate::timer::{LpCounter, TimerConfig, WakeTimer};
use crate::watchdog::{TaskHandle, WatchdogConfig, WatchdogGuard, WatchdogHw};

pub mod budget;
mod mode;

pub use budget::{AbortReason, BudgetInputs, BudgetOutcome};
pub use mode::{ALL_MODES, ModeVotes, SleepMode};

/// Core execution control the orchestrator needs around the halt.
pub trait CpuControl {
    /// Stops the core until a wake event. Returns once execution resumes.
    fn halt(&mut self);

    /// Whether a debug probe currently holds the core.
    fn debugger_attached(&self) -> bool;

    /// Whether an interrupt is pending delivery.
    fn interrupt_pending(&self) -> bool;

    /// Whether deferred maintenance work is queued for the idle loop.
    fn maintenance_pending(&self) -> bool;
}

/// Scheduler-side sink for ticks that elapsed while the core was stopped.
pub trait TickSink {
    fn advance_ticks(&mut self, ticks: u32);
}

/// Everything one hardware target must provide to the orchestrator.
pub trait Platform:
    RailHw + StatusProbe + LpCounter + WatchdogHw + CpuControl + TickSink
{
}

impl<T> Platform for T where
    T: RailHw + StatusProbe + LpCounter + WatchdogHw + CpuControl + TickSink
{
}

/// Static orchestrator parameters.
#[derive(Copy, Clone, Debug)]
pub struct PowerConfig {
    pub timer: TimerConfig,
    pub watchdog: WatchdogConfig,
    /// Shortest span worth powering down for, in low-power cycles.
    pub min_sleep_cycles: u32,
    /// Longest a defer barrier may push sleep out before it is stale.
    pub max_defer_cycles: u64,
    /// Fixed wake-path latency in low-power cycles.
    pub base_wake_cycles: u32,
    /// Extra wake latency when the accurate clock must settle first.
    pub clock_settle_cycles: u32,
}

/// Where the system currently sits in the sleep cycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SystemState {
    /// Executing normally.
    Active,
    /// Core stopped, power up, tick running.
    Idle,
    /// Rails in their sleep configuration, wake trigger armed.
    PoweredDown,
}

/// What one call to [`PowerOrchestrator::enter_idle`] amounted to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SleepOutcome {
    /// The attempt was abandoned; the system never left [`SystemState::Active`].
    Aborted(AbortReason),
    /// The core idled with power up and resumed on the next event.
    IdleOnly,
    /// The system powered down and woke again.
    Woke { slept_ticks: u32 },
}

type SleepSlots = [Option<RailConfig>; 6];

/// The sleep/wake state machine.
pub struct PowerOrchestrator<'a, P: Platform, const N: usize = 8> {
    hw: P,
    cfg: PowerConfig,
    rails: RailController,
    timer: WakeTimer,
    watchdog: WatchdogGuard,
    adapters: AdapterRegistry<'a, N>,
    barrier: SleepBarrier,
    votes: ModeVotes,
    recorder: PowerRecorder,
    state: SystemState,
    wake_needs_accurate_clock: bool,
}

impl<'a, P: Platform, const N: usize> PowerOrchestrator<'a, P, N> {
    pub fn new(hw: P, cfg: PowerConfig) -> Self {
        Self {
            hw,
            cfg,
            rails: RailController::default(),
            timer: WakeTimer::new(cfg.timer),
            watchdog: WatchdogGuard::new(cfg.watchdog),
            adapters: AdapterRegistry::new(),
            barrier: SleepBarrier::new(),
            votes: ModeVotes::new(SleepMode::ExtendedSleep),
            recorder: PowerRecorder::new(),
            state: SystemState::Active,
            wake_needs_accurate_clock: false,
        }
    }

    /// Anchors the tick phase and arms the first tick trigger.
    pub fn start(&mut self) {
        self.timer.start(&mut self.hw);
    }

    #[must_use]
    pub const fn state(&self) -> SystemState {
        self.state
    }

    #[must_use]
    pub const fn events(&self) -> &PowerRecorder {
        &self.recorder
    }

    #[must_use]
    pub const fn hw(&self) -> &P {
        &self.hw
    }

    pub const fn hw_mut(&mut self) -> &mut P {
        &mut self.hw
    }

    /// Monotonic uptime in low-power cycles.
    pub fn timestamp(&mut self) -> u64 {
        self.timer.timestamp(&self.hw)
    }

    /// Votes to keep the system at `mode` or shallower.
    pub fn request_mode(&mut self, mode: SleepMode) {
        self.votes.request(mode);
    }

    /// Releases a previous [`Self::request_mode`] vote.
    pub fn release_mode(&mut self, mode: SleepMode) {
        self.votes.release(mode);
    }

    /// Sets the mode used when no votes are outstanding.
    pub fn set_user_mode(&mut self, mode: SleepMode) {
        self.votes.set_user(mode);
    }

    /// The mode the next sleep attempt will use.
    #[must_use]
    pub fn effective_mode(&self) -> SleepMode {
        self.votes.effective()
    }

    /// The mode used when no votes are outstanding.
    #[must_use]
    pub const fn user_mode(&self) -> SleepMode {
        self.votes.user()
    }

    /// Selects whether wake-up waits for the accurate clock and fans out
    /// the clock-ready callback.
    pub fn set_wake_needs_accurate_clock(&mut self, needed: bool) {
        self.wake_needs_accurate_clock = needed;
    }

    /// Registers a sleep/wake adapter with its wake-side cost in cycles.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryFull`] when all adapter slots are taken.
    pub fn register_adapter(
        &mut self,
        adapter: &'a mut dyn PowerAdapter,
        prep_cycles: u32,
    ) -> Result<AdapterHandle, RegistryFull> {
        self.adapters.register(adapter, prep_cycles)
    }

    pub fn unregister_adapter(&mut self, handle: AdapterHandle) {
        self.adapters.unregister(handle);
    }

    /// Blocks powering down for the next `cycles` low-power cycles.
    pub fn defer_sleep(&mut self, cycles: u32) {
        let now = self.timer.timestamp(&self.hw);
        self.barrier.defer_until(now.saturating_add(u64::from(cycles)));
    }

    /// Adds a task to watchdog monitoring.
    ///
    /// # Errors
    ///
    /// Returns [`crate::watchdog::RegistryFull`] when all slots are taken.
    pub fn watchdog_register(&mut self) -> Result<TaskHandle, crate::watchdog::RegistryFull> {
        self.watchdog.register_task()
    }

    pub fn watchdog_unregister(&mut self, handle: TaskHandle) {
        self.watchdog.unregister_task(&mut self.hw, handle);
    }

    /// Records a watchdog check-in from one monitored task.
    pub fn watchdog_notify(&mut self, handle: TaskHandle) {
        self.watchdog.notify(&mut self.hw, handle);
    }

    /// Applies one rail configuration request.
    ///
    /// # Errors
    ///
    /// Propagates the [`RailError`] of a refused transition.
    pub fn configure_rail(
        &mut self,
        rail: RailId,
        state: PowerState,
        enable: bool,
        voltage: Option<VoltageLevel>,
        max_load: Option<MaxLoad>,
    ) -> Result<(), RailError> {
        self.rails
            .set_rail(&mut self.hw, rail, state, enable, voltage, max_load)
    }

    /// Live configuration of one rail/state slot.
    #[must_use]
    pub fn rail_config(&self, rail: RailId, state: PowerState) -> Option<RailConfig> {
        self.rails.get_rail_config(&self.hw, rail, state)
    }

    /// Tick interrupt entry point: accounts elapsed ticks and re-arms.
    pub fn tick(&mut self) {
        let ticks = self.timer.advance(&mut self.hw);
        self.hw.advance_ticks(ticks);
    }

    /// Attempts to sleep until the scheduler next needs the CPU.
    ///
    /// `requested_ticks` is the span the scheduler can spare, `None` for an
    /// open-ended sleep. Returns what actually happened; every outcome is
    /// also recorded in the event ring.
    pub fn enter_idle(&mut self, requested_ticks: Option<u32>) -> SleepOutcome {
        critical_section::with(|_cs| self.sleep_attempt(requested_ticks))
    }

    fn sleep_attempt(&mut self, requested_ticks: Option<u32>) -> SleepOutcome {
        let mode = self.votes.effective();
        if mode == SleepMode::Active {
            return self.abort(AbortReason::ModeActive);
        }
        if self.hw.debugger_attached() {
            return self.abort(AbortReason::DebuggerAttached);
        }
        if self.hw.maintenance_pending() {
            return self.abort(AbortReason::MaintenancePending);
        }
        if mode == SleepMode::Idle {
            return self.idle_nap();
        }

        let now = self.timer.timestamp(&self.hw);
        let watchdog_bounded = self.watchdog.tasks_monitored();
        let inputs = BudgetInputs {
            requested_ticks,
            tick_period: self.cfg.timer.tick_period,
            tick_offset: self.timer.tick_offset(self.hw.count()),
            wake_latency_cycles: self.wake_latency(),
            watchdog_limit: self.watchdog.max_sleep_cycles(&mut self.hw),
            watchdog_bounded,
            barrier_blocks: self.barrier.blocks(now, self.cfg.max_defer_cycles),
            adapter_cycles: self.adapters.total_prep_cycles(),
            min_sleep_cycles: self.cfg.min_sleep_cycles,
        };
        match budget::compute(&inputs) {
            BudgetOutcome::Abort(reason) => self.abort(reason),
            BudgetOutcome::IdleOnly => self.idle_nap(),
            BudgetOutcome::Sleep { cycles } => self.power_down(mode, Some(cycles)),
            BudgetOutcome::SleepUnbounded => self.power_down(mode, None),
        }
    }

    fn wake_latency(&self) -> u32 {
        let settle = if self.wake_needs_accurate_clock {
            self.cfg.clock_settle_cycles
        } else {
            0
        };
        self.cfg.base_wake_cycles.saturating_add(settle)
    }

    /// Core-off nap with the tick still running and all rails up.
    fn idle_nap(&mut self) -> SleepOutcome {
        self.state = SystemState::Idle;
        self.hw.halt();
        let ticks = self.timer.advance(&mut self.hw);
        self.hw.advance_ticks(ticks);
        self.state = SystemState::Active;
        SleepOutcome::IdleOnly
    }

    fn power_down(&mut self, mode: SleepMode, cycles: Option<u32>) -> SleepOutcome {
        self.state = SystemState::Idle;
        match cycles {
            Some(span) => {
                self.timer.arm_after(&mut self.hw, span);
            }
            None => self.hw.clear_trigger(),
        }

        if self.hw.transfer_in_progress() {
            return self.revert_arm(AbortReason::TransferInProgress);
        }
        if self.adapters.poll_prepare().is_err() {
            return self.revert_arm(AbortReason::AdapterRefused);
        }
        // An interrupt that sneaked in after the adapters accepted would be
        // serviced only after the full wake path; cancel instead.
        if self.hw.interrupt_pending() {
            self.adapters.notify_canceled();
            return self.revert_arm(AbortReason::InterruptPending);
        }

        let saved = self.snapshot_sleep_slots();
        if let Err((rail, error)) = self.apply_sleep_policy(mode) {
            self.restore_sleep_slots(&saved);
            self.adapters.notify_canceled();
            let timestamp = self.timer.timestamp(&self.hw);
            self.recorder.record_rail_fault(rail, error, timestamp);
            return self.revert_arm(AbortReason::RailFault);
        }

        let timestamp = self.timer.timestamp(&self.hw);
        self.recorder.record_sleep_entered(mode, cycles, timestamp);
        self.state = SystemState::PoweredDown;
        self.hw.freeze();
        self.hw.halt();

        self.restore_sleep_slots(&saved);
        let slept_ticks = self.timer.advance(&mut self.hw);
        self.hw.advance_ticks(slept_ticks);
        self.hw.unfreeze();
        self.adapters.notify_wake();
        if self.wake_needs_accurate_clock {
            self.adapters.notify_clock_ready();
        }
        let timestamp = self.timer.timestamp(&self.hw);
        self.recorder.record_wake(slept_ticks, timestamp);
        self.state = SystemState::Active;
        SleepOutcome::Woke { slept_ticks }
    }

    /// Unwinds an armed wake trigger back to the regular tick and records
    /// the abort.
    fn revert_arm(&mut self, reason: AbortReason) -> SleepOutcome {
        self.timer.rearm_tick(&mut self.hw);
        self.state = SystemState::Active;
        self.abort(reason)
    }

    fn abort(&mut self, reason: AbortReason) -> SleepOutcome {
        let timestamp = self.timer.timestamp(&self.hw);
        self.recorder.record_sleep_aborted(reason, timestamp);
        SleepOutcome::Aborted(reason)
    }

    fn snapshot_sleep_slots(&self) -> SleepSlots {
        let mut saved: SleepSlots = [None; 6];
        for rail in ALL_RAILS {
            saved[rail.as_index()] =
                self.rails.get_rail_config(&self.hw, rail, PowerState::Sleep);
        }
        saved
    }

    fn restore_sleep_slots(&mut self, saved: &SleepSlots) {
        for rail in ALL_RAILS {
            let result = match saved[rail.as_index()] {
                Some(config) => self.rails.set_rail(
                    &mut self.hw,
                    rail,
                    PowerState::Sleep,
                    true,
                    Some(config.voltage),
                    Some(config.max_load),
                ),
                None => {
                    self.rails
                        .set_rail(&mut self.hw, rail, PowerState::Sleep, false, None, None)
                }
            };
            if let Err(error) = result {
                let timestamp = self.timer.timestamp(&self.hw);
                self.recorder.record_rail_fault(rail, error, timestamp);
            }
        }
    }

    /// Rewrites the sleep slots for the requested depth.
    ///
    /// Extended sleep trusts the configured sleep slots. Deep sleep keeps
    /// only the retention clamps. Hibernation turns the sleep slots off
    /// entirely, which the dependant rules only permit once every wake
    /// source and low-power clock on those rails is quiet.
    fn apply_sleep_policy(&mut self, mode: SleepMode) -> Result<(), (RailId, RailError)> {
        match mode {
            SleepMode::ExtendedSleep => Ok(()),
            SleepMode::DeepSleep => {
                // V18F cascades from V18P, so it goes first.
                for rail in [RailId::V18F, RailId::V18, RailId::V18P] {
                    self.sleep_slot_off(rail)?;
                }
                self.sleep_slot_clamp(RailId::V12, VoltageLevel::V0_75)?;
                self.sleep_slot_clamp(RailId::V30, VoltageLevel::V3_00)
            }
            SleepMode::Hibernation => {
                for rail in [RailId::V18F, RailId::V18, RailId::V18P, RailId::V12, RailId::V30] {
                    self.sleep_slot_off(rail)?;
                }
                Ok(())
            }
            SleepMode::Active | SleepMode::Idle => Ok(()),
        }
    }

    fn sleep_slot_off(&mut self, rail: RailId) -> Result<(), (RailId, RailError)> {
        self.rails
            .set_rail(&mut self.hw, rail, PowerState::Sleep, false, None, None)
            .map_err(|error| (rail, error))
    }

    fn sleep_slot_clamp(
        &mut self,
        rail: RailId,
        voltage: VoltageLevel,
    ) -> Result<(), (RailId, RailError)> {
        self.rails
            .set_rail(
                &mut self.hw,
                rail,
                PowerState::Sleep,
                true,
                Some(voltage),
                Some(MaxLoad::MicroAmp1),
            )
            .map_err(|error| (rail, error))
    }
}
