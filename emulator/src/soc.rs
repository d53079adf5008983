//! Software model of the power hardware: rails, low-power counter,
//! watchdog, and CPU state, advanced cycle-by-cycle by the session.

use power_core::orchestrator::{CpuControl, TickSink};
use power_core::rails::{ClockId, PeripheralId, PowerState, RailHw, RailId, SourceType, StatusProbe};
use power_core::timer::LpCounter;
use power_core::watchdog::WatchdogHw;

pub const COUNTER_MASK: u32 = 0x00FF_FFFF;

/// Cycles the CPU coasts for when halted with no wake trigger armed.
const UNBOUNDED_HALT_CYCLES: u32 = 1 << 16;

pub struct EmulatedSoc {
    sources: [[u8; 2]; 6],
    voltages: [[power_core::rails::VoltageLevel; 2]; 6],
    trims_applied: u32,

    count: u32,
    trigger: Option<u32>,

    watchdog_value: u32,
    watchdog_frozen: bool,

    pub clocks_running: Vec<ClockId>,
    pub peripherals_running: Vec<PeripheralId>,
    pub debug_feature: bool,
    pub wakeup_armed: bool,
    pub transfer: bool,
    pub debugger: bool,
    pub irq_pending: bool,
    pub maintenance: bool,

    /// Host-injected external wake, in cycles from the next halt.
    pub wake_event_after: Option<u32>,
    pub halts: u32,
    pub ticks_serviced: u64,
}

impl EmulatedSoc {
    #[must_use]
    pub fn new() -> Self {
        use power_core::rails::VoltageLevel as V;
        Self {
            sources: [[0; 2]; 6],
            voltages: [
                [V::V0_90; 2],
                [V::V1_40; 2],
                [V::V1_80; 2],
                [V::V1_80; 2],
                [V::V1_80; 2],
                [V::V3_00; 2],
            ],
            trims_applied: 0,
            count: 0,
            trigger: None,
            watchdog_value: 0x1FFF,
            watchdog_frozen: false,
            clocks_running: vec![ClockId::Rclp],
            peripherals_running: Vec::new(),
            debug_feature: false,
            wakeup_armed: false,
            transfer: false,
            debugger: false,
            irq_pending: false,
            maintenance: false,
            wake_event_after: None,
            halts: 0,
            ticks_serviced: 0,
        }
    }

    #[must_use]
    pub const fn count_now(&self) -> u32 {
        self.count
    }

    #[must_use]
    pub const fn trims_applied(&self) -> u32 {
        self.trims_applied
    }

    /// Burns `cycles` of wall time, counting the watchdog down one unit
    /// per 32 cycles unless frozen.
    pub fn run_for(&mut self, cycles: u32) {
        self.count = self.count.wrapping_add(cycles) & COUNTER_MASK;
        if !self.watchdog_frozen {
            self.watchdog_value = self.watchdog_value.saturating_sub(cycles / 32);
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
}

impl Default for EmulatedSoc {
    fn default() -> Self {
        Self::new()
    }
}

impl RailHw for EmulatedSoc {
    fn source_enabled(&self, rail: RailId, state: PowerState, source: SourceType) -> bool {
        self.sources[rail.as_index()][Self::state_index(state)] & Self::source_bit(source) != 0
    }

    fn set_source(&mut self, rail: RailId, state: PowerState, source: SourceType, enable: bool) {
        let slot = &mut self.sources[rail.as_index()][Self::state_index(state)];
        if enable {
            *slot |= Self::source_bit(source);
        } else {
            *slot &= !Self::source_bit(source);
        }
    }

    fn voltage(&self, rail: RailId, state: PowerState) -> power_core::rails::VoltageLevel {
        self.voltages[rail.as_index()][Self::state_index(state)]
    }

    fn set_voltage(
        &mut self,
        rail: RailId,
        state: PowerState,
        voltage: power_core::rails::VoltageLevel,
    ) {
        self.voltages[rail.as_index()][Self::state_index(state)] = voltage;
    }

    fn apply_trim(&mut self, _rail: RailId, _voltage: power_core::rails::VoltageLevel) {
        self.trims_applied += 1;
    }

    fn regulator_ok(&self, _rail: RailId) -> bool {
        true
    }
}

impl StatusProbe for EmulatedSoc {
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

impl LpCounter for EmulatedSoc {
    fn count(&self) -> u32 {
        self.count
    }

    fn set_trigger(&mut self, value: u32) {
        self.trigger = Some(value & COUNTER_MASK);
    }

    fn clear_trigger(&mut self) {
        self.trigger = None;
    }
}

impl WatchdogHw for EmulatedSoc {
    fn value(&self) -> u32 {
        self.watchdog_value
    }

    fn set_value(&mut self, value: u32) {
        self.watchdog_value = value;
    }

    fn freeze(&mut self) {
        self.watchdog_frozen = true;
    }

    fn unfreeze(&mut self) {
        self.watchdog_frozen = false;
    }
}

impl CpuControl for EmulatedSoc {
    /// Sleeps until the armed trigger, a host-injected wake event, or a
    /// fixed coast when neither is pending.
    fn halt(&mut self) {
        self.halts += 1;
        let until_trigger = self
            .trigger
            .map(|trigger| trigger.wrapping_sub(self.count) & COUNTER_MASK);
        let span = match (self.wake_event_after.take(), until_trigger) {
            (Some(event), Some(trigger)) => event.min(trigger),
            (Some(event), None) => event,
            (None, Some(trigger)) => trigger,
            (None, None) => UNBOUNDED_HALT_CYCLES,
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

impl TickSink for EmulatedSoc {
    fn advance_ticks(&mut self, ticks: u32) {
        self.ticks_serviced += u64::from(ticks);
    }
}
