//! Shared fake SoC used by the integration suites.
//!
//! Registers are plain fields; `halt` advances the low-power counter to the
//! armed trigger (or by a configurable early-wake span) so whole sleep
//! cycles run synchronously inside a test.

use power_core::orchestrator::{CpuControl, PowerConfig, TickSink};
use power_core::rails::{
    ClockId, PeripheralId, PowerState, RailHw, RailId, SourceType, StatusProbe, VoltageLevel,
};
use power_core::timer::{LpCounter, TimerConfig};
use power_core::watchdog::{WatchdogConfig, WatchdogHw};

pub const COUNTER_MASK: u32 = 0x00FF_FFFF;
pub const TICK_PERIOD: u32 = 32;
pub const CYCLES_PER_WATCHDOG_UNIT: u32 = 32;

#[must_use]
pub fn test_config() -> PowerConfig {
    PowerConfig {
        timer: TimerConfig {
            counter_mask: COUNTER_MASK,
            tick_period: TICK_PERIOD,
            guard_cycles: 3,
        },
        watchdog: WatchdogConfig {
            cycles_per_unit: CYCLES_PER_WATCHDOG_UNIT,
            reload_value: 100,
            idle_reset_value: 1000,
            tick_period: TICK_PERIOD,
        },
        min_sleep_cycles: 64,
        max_defer_cycles: 100_000,
        base_wake_cycles: 8,
        clock_settle_cycles: 40,
    }
}

/// Register write recorded for ordering assertions.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Op {
    SetSource(RailId, PowerState, SourceType, bool),
    SetVoltage(RailId, PowerState, VoltageLevel),
    Trim(RailId, VoltageLevel),
}

pub struct FakeSoc {
    sources: [[u8; 2]; 6],
    voltages: [[VoltageLevel; 2]; 6],
    pub ops: Vec<Op>,

    pub count: u32,
    pub trigger: Option<u32>,

    pub watchdog_value: u32,
    pub watchdog_frozen: bool,

    pub clocks_running: Vec<ClockId>,
    pub peripherals_running: Vec<PeripheralId>,
    pub debug_feature: bool,
    pub wakeup_armed: bool,
    pub transfer: bool,

    pub debugger: bool,
    pub irq_pending: bool,
    pub maintenance: bool,
    pub regulator_ready: bool,

    /// When set, `halt` advances by this many cycles instead of jumping to
    /// the armed trigger.
    pub wake_early_after: Option<u32>,
    pub halts: u32,
    pub ticks_advanced: u32,
}

impl FakeSoc {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sources: [[0; 2]; 6],
            voltages: [
                [VoltageLevel::V0_90; 2],
                [VoltageLevel::V1_40; 2],
                [VoltageLevel::V1_80; 2],
                [VoltageLevel::V1_80; 2],
                [VoltageLevel::V1_80; 2],
                [VoltageLevel::V3_00; 2],
            ],
            ops: Vec::new(),
            count: 0,
            trigger: None,
            watchdog_value: 100,
            watchdog_frozen: false,
            clocks_running: vec![ClockId::Rclp],
            peripherals_running: Vec::new(),
            debug_feature: false,
            wakeup_armed: false,
            transfer: false,
            debugger: false,
            irq_pending: false,
            maintenance: false,
            regulator_ready: true,
            wake_early_after: None,
            halts: 0,
            ticks_advanced: 0,
        }
    }

    fn state_index(state: PowerState) -> usize {
        match state {
            PowerState::Active => 0,
            PowerState::Sleep => 1,
        }
    }

    fn source_bit(source: SourceType) -> u8 {
        match source {
            SourceType::LdoLowRipple => 1 << 0,
            SourceType::DcdcHighEfficiency => 1 << 1,
            SourceType::PassThrough => 1 << 2,
            SourceType::Auto => 1 << 3,
            SourceType::Clamp => 1 << 4,
        }
    }

    /// Advances the counter, counting down the watchdog unless frozen.
    pub fn run_for(&mut self, cycles: u32) {
        self.count = self.count.wrapping_add(cycles) & COUNTER_MASK;
        if !self.watchdog_frozen {
            self.watchdog_value = self
                .watchdog_value
                .saturating_sub(cycles / CYCLES_PER_WATCHDOG_UNIT);
        }
    }
}

impl Default for FakeSoc {
    fn default() -> Self {
        Self::new()
    }
}

impl RailHw for FakeSoc {
    fn source_enabled(&self, rail: RailId, state: PowerState, source: SourceType) -> bool {
        self.sources[rail.as_index()][Self::state_index(state)] & Self::source_bit(source) != 0
    }

    fn set_source(&mut self, rail: RailId, state: PowerState, source: SourceType, enabled: bool) {
        let slot = &mut self.sources[rail.as_index()][Self::state_index(state)];
        if enabled {
            *slot |= Self::source_bit(source);
        } else {
            *slot &= !Self::source_bit(source);
        }
        self.ops.push(Op::SetSource(rail, state, source, enabled));
    }

    fn voltage(&self, rail: RailId, state: PowerState) -> VoltageLevel {
        self.voltages[rail.as_index()][Self::state_index(state)]
    }

    fn set_voltage(&mut self, rail: RailId, state: PowerState, voltage: VoltageLevel) {
        self.voltages[rail.as_index()][Self::state_index(state)] = voltage;
        self.ops.push(Op::SetVoltage(rail, state, voltage));
    }

    fn apply_trim(&mut self, rail: RailId, voltage: VoltageLevel) {
        self.ops.push(Op::Trim(rail, voltage));
    }

    fn regulator_ok(&self, _rail: RailId) -> bool {
        self.regulator_ready
    }
}

impl StatusProbe for FakeSoc {
    fn clock_active(&self, clock: ClockId) -> bool {
        self.clocks_running.contains(&clock)
    }

    fn peripheral_active(&self, peripheral: PeripheralId) -> bool {
        self.peripherals_running.contains(&peripheral)
    }

    fn debug_feature_active(&self) -> bool {
        self.debug_feature
    }

    fn wakeup_source_armed(&self) -> bool {
        self.wakeup_armed
    }

    fn transfer_in_progress(&self) -> bool {
        self.transfer
    }
}

impl LpCounter for FakeSoc {
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

impl WatchdogHw for FakeSoc {
    fn value(&self) -> u32 {
        self.watchdog_value
    }

    fn set_value(&mut self, units: u32) {
        self.watchdog_value = units;
    }

    fn freeze(&mut self) {
        self.watchdog_frozen = true;
    }

    fn unfreeze(&mut self) {
        self.watchdog_frozen = false;
    }
}

impl CpuControl for FakeSoc {
    fn halt(&mut self) {
        self.halts += 1;
        let span = match (self.wake_early_after.take(), self.trigger) {
            (Some(early), _) => early,
            (None, Some(trigger)) => trigger.wrapping_sub(self.count) & COUNTER_MASK,
            (None, None) => 10_000,
        };
        self.run_for(span);
    }

    fn debugger_attached(&self) -> bool {
        self.debugger
    }

    fn interrupt_pending(&self) -> bool {
        self.irq_pending
    }

    fn maintenance_pending(&self) -> bool {
        self.maintenance
    }
}

impl TickSink for FakeSoc {
    fn advance_ticks(&mut self, ticks: u32) {
        self.ticks_advanced += ticks;
    }
}
