//! Wake timer built on a free-running low-power counter.
//!
//! The counter is narrow (typically 24 bits) and wraps silently, so every
//! difference and every trigger value is computed modulo `counter_mask + 1`.
//! The timer owns the tick phase: `last_trigger` always sits on a tick
//! boundary, ticks are derived by dividing the masked distance from it, and
//! a 64-bit uptime is maintained by extending the counter on every read.

/// Register-level access to the low-power counter and its compare trigger.
pub trait LpCounter {
    /// Current counter value, already masked to the counter width.
    fn count(&self) -> u32;

    /// Programs the compare trigger that raises the wake interrupt.
    fn set_trigger(&mut self, trigger: u32);

    /// Disables the compare trigger.
    fn clear_trigger(&mut self);
}

/// Static timing parameters of the counter and the tick it drives.
#[derive(Copy, Clone, Debug)]
pub struct TimerConfig {
    /// Counter width mask, e.g. `0x00FF_FFFF` for a 24-bit counter.
    pub counter_mask: u32,
    /// Low-power clock cycles per scheduler tick.
    pub tick_period: u32,
    /// Minimum distance a trigger must be programmed ahead of the counter
    /// for the compare hardware to latch it reliably.
    pub guard_cycles: u32,
}

impl TimerConfig {
    /// Masked distance from `from` up to `to`, honoring wraparound.
    #[must_use]
    pub const fn distance(&self, from: u32, to: u32) -> u32 {
        to.wrapping_sub(from) & self.counter_mask
    }
}

/// Tick bookkeeping over an [`LpCounter`].
#[derive(Debug)]
pub struct WakeTimer {
    cfg: TimerConfig,
    /// Tick boundary the current tick started on. Stays on tick phase even
    /// across long sleeps and guard pushes.
    last_trigger: u32,
    /// Counter value at the last uptime extension.
    last_count: u32,
    uptime_cycles: u64,
}

impl WakeTimer {
    #[must_use]
    pub const fn new(cfg: TimerConfig) -> Self {
        Self {
            cfg,
            last_trigger: 0,
            last_count: 0,
            uptime_cycles: 0,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &TimerConfig {
        &self.cfg
    }

    /// Tick boundary the current tick started on.
    #[must_use]
    pub const fn last_trigger(&self) -> u32 {
        self.last_trigger
    }

    /// Anchors the tick phase at the current counter value and arms the
    /// first tick trigger.
    pub fn start<H: LpCounter>(&mut self, hw: &mut H) {
        let now = hw.count();
        self.last_trigger = now;
        self.last_count = now;
        hw.set_trigger(now.wrapping_add(self.cfg.tick_period) & self.cfg.counter_mask);
    }

    /// Cycles elapsed since the current tick boundary.
    ///
    /// Meaningful while the counter is within one tick of `last_trigger`,
    /// which holds whenever the tick interrupt is being serviced promptly.
    #[must_use]
    pub fn tick_offset(&self, now: u32) -> u32 {
        self.cfg.distance(self.last_trigger, now)
    }

    /// Programs the trigger `cycles` ahead of the counter and returns the
    /// resulting trigger value. The tick phase is left untouched so the arm
    /// can be reverted with [`Self::rearm_tick`].
    pub fn arm_after<H: LpCounter>(&mut self, hw: &mut H, cycles: u32) -> u32 {
        let trigger = hw.count().wrapping_add(cycles) & self.cfg.counter_mask;
        hw.set_trigger(trigger);
        trigger
    }

    /// Re-arms the next regular tick boundary, pushing it forward by whole
    /// periods until it is strictly beyond the guard window.
    pub fn rearm_tick<H: LpCounter>(&mut self, hw: &mut H) {
        let now = hw.count();
        let elapsed = self.cfg.distance(self.last_trigger, now);
        let ticks = elapsed / self.cfg.tick_period;
        let mut trigger = self
            .last_trigger
            .wrapping_add((ticks + 1).wrapping_mul(self.cfg.tick_period))
            & self.cfg.counter_mask;
        while self.cfg.distance(now, trigger) <= self.cfg.guard_cycles {
            trigger = trigger.wrapping_add(self.cfg.tick_period) & self.cfg.counter_mask;
        }
        hw.set_trigger(trigger);
    }

    /// Accounts for all ticks elapsed since the current tick boundary,
    /// re-arms the next one, and returns the elapsed tick count.
    ///
    /// Called from the tick interrupt and after every sleep exit. Must run
    /// at least once per counter wrap for the uptime extension to stay
    /// monotonic.
    pub fn advance<H: LpCounter>(&mut self, hw: &mut H) -> u32 {
        let now = hw.count();
        self.extend_uptime(now);

        let elapsed = self.cfg.distance(self.last_trigger, now);
        let ticks = elapsed / self.cfg.tick_period;
        self.last_trigger = self
            .last_trigger
            .wrapping_add(ticks.wrapping_mul(self.cfg.tick_period))
            & self.cfg.counter_mask;
        let mut trigger =
            self.last_trigger.wrapping_add(self.cfg.tick_period) & self.cfg.counter_mask;
        // A boundary inside the guard window cannot be latched in time; skip
        // to the next one. `last_trigger` stays on the reported boundary, so
        // the skipped tick is recovered by the division on the next advance.
        while self.cfg.distance(now, trigger) <= self.cfg.guard_cycles {
            trigger = trigger.wrapping_add(self.cfg.tick_period) & self.cfg.counter_mask;
        }
        hw.set_trigger(trigger);
        ticks
    }

    /// Monotonic uptime in low-power clock cycles.
    pub fn timestamp<H: LpCounter>(&mut self, hw: &H) -> u64 {
        let now = hw.count();
        self.extend_uptime(now);
        self.uptime_cycles
    }

    fn extend_uptime(&mut self, now: u32) {
        let delta = self.cfg.distance(self.last_count, now);
        self.uptime_cycles += u64::from(delta);
        self.last_count = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CFG: TimerConfig = TimerConfig {
        counter_mask: 0x00FF_FFFF,
        tick_period: 32,
        guard_cycles: 3,
    };

    struct FakeCounter {
        count: u32,
        trigger: Option<u32>,
    }

    impl FakeCounter {
        fn at(count: u32) -> Self {
            Self {
                count: count & CFG.counter_mask,
                trigger: None,
            }
        }

        fn run_to(&mut self, count: u32) {
            self.count = count & CFG.counter_mask;
        }
    }

    impl LpCounter for FakeCounter {
        fn count(&self) -> u32 {
            self.count
        }

        fn set_trigger(&mut self, trigger: u32) {
            self.trigger = Some(trigger);
        }

        fn clear_trigger(&mut self) {
            self.trigger = None;
        }
    }

    #[test]
    fn start_arms_one_period_ahead() {
        let mut hw = FakeCounter::at(1000);
        let mut timer = WakeTimer::new(CFG);
        timer.start(&mut hw);
        assert_eq!(hw.trigger, Some(1032));
        assert_eq!(timer.last_trigger(), 1000);
    }

    #[test]
    fn tick_offset_counts_from_the_boundary() {
        let mut hw = FakeCounter::at(1000);
        let mut timer = WakeTimer::new(CFG);
        timer.start(&mut hw);
        assert_eq!(timer.tick_offset(1000), 0);
        assert_eq!(timer.tick_offset(1013), 13);
    }

    #[test]
    fn tick_offset_survives_counter_wrap() {
        let mut hw = FakeCounter::at(CFG.counter_mask - 4);
        let mut timer = WakeTimer::new(CFG);
        timer.start(&mut hw);
        assert_eq!(timer.tick_offset(7), 12);
    }

    #[test]
    fn advance_reports_whole_ticks_and_keeps_phase() {
        let mut hw = FakeCounter::at(0);
        let mut timer = WakeTimer::new(CFG);
        timer.start(&mut hw);

        hw.run_to(32);
        assert_eq!(timer.advance(&mut hw), 1);
        assert_eq!(timer.last_trigger(), 32);
        assert_eq!(hw.trigger, Some(64));

        // Oversleep by three ticks plus a few cycles.
        hw.run_to(32 + 3 * 32 + 5);
        assert_eq!(timer.advance(&mut hw), 3);
        assert_eq!(timer.last_trigger(), 128);
        assert_eq!(hw.trigger, Some(160));
    }

    #[test]
    fn advance_skips_a_boundary_inside_the_guard_window() {
        let mut hw = FakeCounter::at(0);
        let mut timer = WakeTimer::new(CFG);
        timer.start(&mut hw);

        // 30 cycles in, the next boundary (32) is within the guard window,
        // so the trigger lands on 64 instead.
        hw.run_to(30);
        assert_eq!(timer.advance(&mut hw), 0);
        assert_eq!(hw.trigger, Some(64));
        // Phase is preserved: the skipped tick shows up on the next advance.
        hw.run_to(64);
        assert_eq!(timer.advance(&mut hw), 2);
    }

    #[test]
    fn advance_wraps_the_trigger_with_the_counter() {
        let start = CFG.counter_mask + 1 - 16;
        let mut hw = FakeCounter::at(start);
        let mut timer = WakeTimer::new(CFG);
        timer.start(&mut hw);
        assert_eq!(hw.trigger, Some(16));

        hw.run_to(16);
        assert_eq!(timer.advance(&mut hw), 1);
        assert_eq!(timer.last_trigger(), 16);
        assert_eq!(hw.trigger, Some(48));
    }

    #[test]
    fn arm_after_leaves_phase_for_rearm() {
        let mut hw = FakeCounter::at(100);
        let mut timer = WakeTimer::new(CFG);
        timer.start(&mut hw);

        hw.run_to(110);
        assert_eq!(timer.arm_after(&mut hw, 500), 610);
        assert_eq!(hw.trigger, Some(610));

        // Reverting restores the next boundary on the original phase.
        timer.rearm_tick(&mut hw);
        assert_eq!(hw.trigger, Some(132));
        assert_eq!(timer.last_trigger(), 100);
    }

    #[test]
    fn timestamp_is_monotonic_across_wrap() {
        let mut hw = FakeCounter::at(CFG.counter_mask - 10);
        let mut timer = WakeTimer::new(CFG);
        timer.start(&mut hw);
        assert_eq!(timer.timestamp(&hw), 0);

        hw.run_to(20);
        assert_eq!(timer.timestamp(&hw), 31);

        hw.run_to(20 + 1000);
        assert_eq!(timer.timestamp(&hw), 1031);
    }
}
