//! Dependency and dependant rules for rail transitions.
//!
//! Dependencies gate *enables*: a source may only be switched on when the
//! rails or supplies it draws from are already up. Dependants gate
//! *disables*: a rail may only be switched off when nothing still powered
//! from it is active. Both are static data tables keyed by rail and state;
//! live conditions are read through [`StatusProbe`].

use super::{ClockId, PeripheralId, PowerState, RailError, RailHw, RailId, SourceType};

/// Live system status consulted by the dependant rules.
///
/// Kept separate from [`RailHw`] because these bits belong to clock and
/// peripheral control blocks, not the power controller.
pub trait StatusProbe {
    fn clock_active(&self, clock: ClockId) -> bool;
    fn peripheral_active(&self, peripheral: PeripheralId) -> bool;
    fn debug_feature_active(&self) -> bool;
    fn wakeup_source_armed(&self) -> bool;
    /// Reports whether a bus transfer that must not lose power is running.
    fn transfer_in_progress(&self) -> bool;
}

/// Prerequisite for enabling a source on a rail.
#[derive(Copy, Clone, Debug)]
pub enum Requirement {
    /// The named rail must have an enabled source in the given state slot.
    RailEnabled(RailId),
}

impl Requirement {
    pub(crate) fn holds<H: RailHw>(&self, hw: &H, state: PowerState) -> bool {
        match self {
            Requirement::RailEnabled(rail) => any_source_enabled(hw, *rail, state),
        }
    }
}

/// Live condition that blocks disabling a rail.
#[derive(Copy, Clone, Debug)]
pub enum Condition {
    ClockRunning(ClockId),
    PeripheralRunning(PeripheralId),
    DebugFeatureActive,
    WakeupSourceArmed,
    /// A cascaded rail still has an enabled source in the same state slot.
    RailEnabled(RailId),
}

impl Condition {
    pub(crate) fn holds<T: RailHw + StatusProbe>(&self, hw: &T, state: PowerState) -> bool {
        match self {
            Condition::ClockRunning(clock) => hw.clock_active(*clock),
            Condition::PeripheralRunning(peripheral) => hw.peripheral_active(*peripheral),
            Condition::DebugFeatureActive => hw.debug_feature_active(),
            Condition::WakeupSourceArmed => hw.wakeup_source_armed(),
            Condition::RailEnabled(rail) => any_source_enabled(hw, *rail, state),
        }
    }
}

/// One dependant rule: when `condition` holds, a disable fails with `reason`.
#[derive(Copy, Clone, Debug)]
pub struct Blocker {
    pub condition: Condition,
    pub reason: RailError,
}

const fn clock_blocker(clock: ClockId) -> Blocker {
    Blocker {
        condition: Condition::ClockRunning(clock),
        reason: RailError::ClockActive(clock),
    }
}

const fn peripheral_blocker(peripheral: PeripheralId) -> Blocker {
    Blocker {
        condition: Condition::PeripheralRunning(peripheral),
        reason: RailError::PeripheralActive(peripheral),
    }
}

fn any_source_enabled<H: RailHw>(hw: &H, rail: RailId, state: PowerState) -> bool {
    use super::BOARD_RAIL_TABLE;
    BOARD_RAIL_TABLE
        .rail(rail)
        .options
        .iter()
        .any(|option| option.allows_state(state) && hw.source_enabled(rail, state, option.source))
}

/// Prerequisites for enabling `source` on `rail` in the given state slot.
///
/// An unmet requirement fails the enable with [`RailError::NotEnoughPower`].
#[must_use]
pub fn dependencies(rail: RailId, _state: PowerState, source: SourceType) -> &'static [Requirement] {
    // The switching converters and the flash pass-through draw from V30 and
    // V18P respectively; LDOs and clamps run straight off the supply pin.
    match (rail, source) {
        (RailId::V12 | RailId::V14 | RailId::V18 | RailId::V18P, SourceType::DcdcHighEfficiency) => {
            &[Requirement::RailEnabled(RailId::V30)]
        }
        (RailId::V18F, SourceType::PassThrough) => &[Requirement::RailEnabled(RailId::V18P)],
        _ => &[],
    }
}

const V12_ACTIVE_BLOCKERS: &[Blocker] = &[
    clock_blocker(ClockId::Xtal32M),
    clock_blocker(ClockId::Pll),
    peripheral_blocker(PeripheralId::Usb),
    peripheral_blocker(PeripheralId::Otp),
];

const V12_SLEEP_BLOCKERS: &[Blocker] = &[
    clock_blocker(ClockId::Rclp),
    clock_blocker(ClockId::Xtal32K),
    Blocker {
        condition: Condition::WakeupSourceArmed,
        reason: RailError::WakeupSourceArmed,
    },
];

const V14_BLOCKERS: &[Blocker] = &[
    clock_blocker(ClockId::Xtal32M),
    clock_blocker(ClockId::Pll),
    peripheral_blocker(PeripheralId::Gpadc),
];

const V18P_BLOCKERS: &[Blocker] = &[
    peripheral_blocker(PeripheralId::Qspi),
    peripheral_blocker(PeripheralId::Gpio),
    Blocker {
        condition: Condition::RailEnabled(RailId::V18F),
        reason: RailError::OtherLoadsDependency,
    },
];

const V30_BLOCKERS: &[Blocker] = &[
    peripheral_blocker(PeripheralId::Gpio),
    Blocker {
        condition: Condition::DebugFeatureActive,
        reason: RailError::DebugFeatureActive,
    },
];

/// Conditions that block disabling `rail` in the given state slot.
#[must_use]
pub fn dependants(rail: RailId, state: PowerState) -> &'static [Blocker] {
    match (rail, state) {
        (RailId::V12, PowerState::Active) => V12_ACTIVE_BLOCKERS,
        (RailId::V12, PowerState::Sleep) => V12_SLEEP_BLOCKERS,
        (RailId::V14, _) => V14_BLOCKERS,
        (RailId::V18P, _) => V18P_BLOCKERS,
        (RailId::V30, _) => V30_BLOCKERS,
        _ => &[],
    }
}
