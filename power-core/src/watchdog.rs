//! Watchdog bookkeeping and the sleep budget it imposes.
//!
//! Tasks register for monitoring and notify once per loop; the hardware
//! counter is only reloaded when every monitored task has checked in, so a
//! single stuck task still trips the reset. Before sleeping, the remaining
//! watchdog budget bounds the sleep span: the system must wake early enough
//! to feed the watchdog with margin to spare.

/// Register-level access to the watchdog counter.
pub trait WatchdogHw {
    /// Remaining watchdog budget in watchdog units.
    fn value(&self) -> u32;

    /// Reloads the watchdog counter.
    fn set_value(&mut self, units: u32);

    /// Suspends the watchdog countdown.
    fn freeze(&mut self);

    /// Resumes the watchdog countdown.
    fn unfreeze(&mut self);
}

/// Static watchdog timing parameters.
#[derive(Copy, Clone, Debug)]
pub struct WatchdogConfig {
    /// Low-power clock cycles per watchdog unit.
    pub cycles_per_unit: u32,
    /// Units reloaded when a full notify round completes.
    pub reload_value: u32,
    /// Units written before an open-ended sleep when no task is monitored.
    pub idle_reset_value: u32,
    /// Low-power clock cycles per scheduler tick, for the wake margin.
    pub tick_period: u32,
}

/// Opaque handle identifying one monitored task.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskHandle(u8);

/// All monitoring slots are taken.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegistryFull;

const MAX_TASKS: u8 = 32;

/// Task monitoring state and sleep budget arithmetic.
#[derive(Debug)]
pub struct WatchdogGuard {
    cfg: WatchdogConfig,
    monitored: u32,
    notified: u32,
}

impl WatchdogGuard {
    #[must_use]
    pub const fn new(cfg: WatchdogConfig) -> Self {
        Self {
            cfg,
            monitored: 0,
            notified: 0,
        }
    }

    /// Registers a task for monitoring.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryFull`] when all slots are taken.
    pub fn register_task(&mut self) -> Result<TaskHandle, RegistryFull> {
        for bit in 0..MAX_TASKS {
            if self.monitored & (1 << bit) == 0 {
                self.monitored |= 1 << bit;
                return Ok(TaskHandle(bit));
            }
        }
        Err(RegistryFull)
    }

    /// Removes a task from monitoring. Its pending notify state is dropped.
    pub fn unregister_task<H: WatchdogHw>(&mut self, hw: &mut H, handle: TaskHandle) {
        self.monitored &= !(1 << handle.0);
        self.notified &= !(1 << handle.0);
        self.maybe_reload(hw);
    }

    /// Records a check-in from one monitored task. The hardware counter is
    /// reloaded only once every monitored task has checked in.
    pub fn notify<H: WatchdogHw>(&mut self, hw: &mut H, handle: TaskHandle) {
        self.notified |= (1 << handle.0) & self.monitored;
        self.maybe_reload(hw);
    }

    /// Reports whether any task is currently monitored.
    #[must_use]
    pub const fn tasks_monitored(&self) -> bool {
        self.monitored != 0
    }

    /// Cycles the system must keep in reserve when sleeping: one watchdog
    /// unit of reload slack plus half a tick of wake jitter.
    #[must_use]
    pub const fn margin_cycles(&self) -> u32 {
        self.cfg.cycles_per_unit + self.cfg.tick_period / 2
    }

    /// Longest sleep span the watchdog budget permits right now.
    ///
    /// With no monitored task the counter is first reloaded to the idle
    /// value, so an otherwise idle system still gets its full span.
    pub fn max_sleep_cycles<H: WatchdogHw>(&mut self, hw: &mut H) -> u32 {
        let units = if self.tasks_monitored() {
            hw.value()
        } else {
            hw.set_value(self.cfg.idle_reset_value);
            self.cfg.idle_reset_value
        };
        units
            .saturating_mul(self.cfg.cycles_per_unit)
            .saturating_sub(self.margin_cycles())
    }

    fn maybe_reload<H: WatchdogHw>(&mut self, hw: &mut H) {
        if self.monitored != 0 && self.notified == self.monitored {
            hw.set_value(self.cfg.reload_value);
            self.notified = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CFG: WatchdogConfig = WatchdogConfig {
        cycles_per_unit: 10,
        reload_value: 100,
        idle_reset_value: 200,
        tick_period: 32,
    };

    struct FakeWatchdog {
        value: u32,
        frozen: bool,
    }

    impl WatchdogHw for FakeWatchdog {
        fn value(&self) -> u32 {
            self.value
        }

        fn set_value(&mut self, units: u32) {
            self.value = units;
        }

        fn freeze(&mut self) {
            self.frozen = true;
        }

        fn unfreeze(&mut self) {
            self.frozen = false;
        }
    }

    fn fake(value: u32) -> FakeWatchdog {
        FakeWatchdog {
            value,
            frozen: false,
        }
    }

    #[test]
    fn reload_waits_for_every_monitored_task() {
        let mut hw = fake(7);
        let mut guard = WatchdogGuard::new(CFG);
        let a = guard.register_task().unwrap();
        let b = guard.register_task().unwrap();

        guard.notify(&mut hw, a);
        assert_eq!(hw.value, 7);
        guard.notify(&mut hw, b);
        assert_eq!(hw.value, CFG.reload_value);
    }

    #[test]
    fn unregister_releases_a_pending_round() {
        let mut hw = fake(7);
        let mut guard = WatchdogGuard::new(CFG);
        let a = guard.register_task().unwrap();
        let b = guard.register_task().unwrap();

        guard.notify(&mut hw, a);
        guard.unregister_task(&mut hw, b);
        // `a` is now the only monitored task and has already checked in.
        assert_eq!(hw.value, CFG.reload_value);
    }

    #[test]
    fn budget_subtracts_the_margin() {
        let mut hw = fake(50);
        let mut guard = WatchdogGuard::new(CFG);
        let _task = guard.register_task().unwrap();
        // 50 units * 10 cycles, minus one unit and half a tick.
        assert_eq!(guard.max_sleep_cycles(&mut hw), 500 - (10 + 16));
    }

    #[test]
    fn budget_saturates_when_expiry_is_imminent() {
        let mut hw = fake(2);
        let mut guard = WatchdogGuard::new(CFG);
        let _task = guard.register_task().unwrap();
        assert_eq!(guard.max_sleep_cycles(&mut hw), 0);
    }

    #[test]
    fn idle_system_reloads_before_budgeting() {
        let mut hw = fake(3);
        let mut guard = WatchdogGuard::new(CFG);
        assert_eq!(
            guard.max_sleep_cycles(&mut hw),
            CFG.idle_reset_value * CFG.cycles_per_unit - (10 + 16)
        );
        assert_eq!(hw.value, CFG.idle_reset_value);
    }
}
