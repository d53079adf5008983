//! Power rail state machine shared by firmware and host targets.
//!
//! Every rail exposes two configuration slots (*active* and *sleep*), each
//! backed directly by hardware registers reached through the [`RailHw`]
//! capability trait. The [`RailController`] is a pure guarded-transition
//! façade: it keeps no state of its own, re-reads the live configuration
//! before every change, and refuses transitions whose dependency or
//! dependant conditions do not hold.

use core::fmt;

pub mod rules;
pub mod table;

pub use rules::{Blocker, Condition, Requirement, StatusProbe};
pub use table::{RailTable, SourceOption, BOARD_RAIL_TABLE};

/// Identifier for the independently controllable voltage domains.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RailId {
    /// 1.2 V digital core rail.
    V12,
    /// 1.4 V radio/analog rail.
    V14,
    /// 1.8 V general peripheral rail.
    V18,
    /// 1.8 V always-on peripheral rail.
    V18P,
    /// 1.8 V flash rail, cascaded from V18P.
    V18F,
    /// 3.0 V I/O and bandgap rail.
    V30,
}

impl RailId {
    /// Deterministic index for lookups into [`ALL_RAILS`].
    #[must_use]
    pub const fn as_index(self) -> usize {
        match self {
            RailId::V12 => 0,
            RailId::V14 => 1,
            RailId::V18 => 2,
            RailId::V18P => 3,
            RailId::V18F => 4,
            RailId::V30 => 5,
        }
    }

    /// Attempts to construct a [`RailId`] from a raw index.
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(RailId::V12),
            1 => Some(RailId::V14),
            2 => Some(RailId::V18),
            3 => Some(RailId::V18P),
            4 => Some(RailId::V18F),
            5 => Some(RailId::V30),
            _ => None,
        }
    }
}

/// Compile-time catalog of every rail, in dependency-safe enable order.
pub const ALL_RAILS: [RailId; 6] = [
    RailId::V12,
    RailId::V14,
    RailId::V18,
    RailId::V18P,
    RailId::V18F,
    RailId::V30,
];

/// Which configuration slot of a rail a call refers to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerState {
    /// Configuration applied while the system executes.
    Active,
    /// Configuration applied while the system sleeps.
    Sleep,
}

/// Regulator/source kind that can drive a rail.
///
/// At most one source may drive a given rail/state pair; enabling one
/// disables its mutually exclusive alternatives in the same sequence.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SourceType {
    /// Low-ripple linear regulator.
    LdoLowRipple,
    /// High-efficiency switching converter.
    DcdcHighEfficiency,
    /// Pass-through from a parent rail.
    PassThrough,
    /// Source selection left to hardware.
    Auto,
    /// Retention clamp, only able to hold a quiescent load.
    Clamp,
}

/// Enumerated voltage levels used across the rail set.
///
/// Legality per rail/state is data in [`RailTable`], not behavior.
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VoltageLevel {
    V0_75,
    V0_90,
    V1_20,
    V1_40,
    V1_80,
    V3_00,
    V3_30,
}

/// Enumerated maximum load currents.
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MaxLoad {
    /// Quiescent retention load only.
    MicroAmp1,
    MilliAmp20,
    MilliAmp50,
    MilliAmp150,
}

/// Clock sources referenced by dependency rules.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockId {
    /// Low-power RC oscillator.
    Rclp,
    /// 32.768 kHz crystal.
    Xtal32K,
    /// 32 MHz crystal.
    Xtal32M,
    /// System PLL.
    Pll,
}

/// Peripheral blocks referenced by dependant rules.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PeripheralId {
    Gpio,
    Usb,
    Otp,
    Qspi,
    Gpadc,
}

/// Closed set of reasons a rail transition can be refused.
///
/// A refused transition is never partially applied.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RailError {
    /// A prerequisite source or rail for the requested configuration is off.
    NotEnoughPower,
    /// The voltage/load combination is not legal for this rail and state.
    InvalidConfig,
    /// A clock sourced from this rail is still running.
    ClockActive(ClockId),
    /// A peripheral supplied by this rail is still active.
    PeripheralActive(PeripheralId),
    /// A debug feature powered from this rail is in use.
    DebugFeatureActive,
    /// A wake-up source powered from this rail is still armed.
    WakeupSourceArmed,
    /// Another rail is cascaded from this one and still enabled.
    OtherLoadsDependency,
    /// The regulator did not report ready within the polling bound.
    RegulatorTimeout,
}

impl fmt::Display for RailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RailError::NotEnoughPower => write!(f, "prerequisite supply is off"),
            RailError::InvalidConfig => write!(f, "illegal voltage/load combination"),
            RailError::ClockActive(clock) => write!(f, "clock {clock:?} still active"),
            RailError::PeripheralActive(peripheral) => {
                write!(f, "peripheral {peripheral:?} still active")
            }
            RailError::DebugFeatureActive => write!(f, "debug feature active"),
            RailError::WakeupSourceArmed => write!(f, "wake-up source armed"),
            RailError::OtherLoadsDependency => write!(f, "dependent rail still enabled"),
            RailError::RegulatorTimeout => write!(f, "regulator ready timeout"),
        }
    }
}

/// Snapshot of one rail/state configuration slot read back from hardware.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RailConfig {
    pub voltage: VoltageLevel,
    pub max_load: MaxLoad,
    pub source: SourceType,
}

/// Register-level access to the rail hardware.
///
/// Implementations map directly onto power-control registers; all policy
/// (dependency checks, exclusivity, ordering) lives in [`RailController`].
pub trait RailHw {
    /// Reports whether `source` currently drives `rail` in `state`.
    fn source_enabled(&self, rail: RailId, state: PowerState, source: SourceType) -> bool;

    /// Enables or disables one source for a rail/state pair.
    fn set_source(&mut self, rail: RailId, state: PowerState, source: SourceType, enabled: bool);

    /// Reads the programmed voltage level for a rail/state pair.
    fn voltage(&self, rail: RailId, state: PowerState) -> VoltageLevel;

    /// Programs the voltage level for a rail/state pair.
    fn set_voltage(&mut self, rail: RailId, state: PowerState, voltage: VoltageLevel);

    /// Applies the calibration trim matching `voltage` to the rail regulator.
    fn apply_trim(&mut self, rail: RailId, voltage: VoltageLevel);

    /// Reports whether the rail regulator has settled at its programmed point.
    fn regulator_ok(&self, rail: RailId) -> bool;
}

/// Upper bound on `regulator_ok` polls before a transition is failed.
///
/// Regulator acknowledgement is a sub-microsecond hardware latency, so the
/// spin stays in place rather than yielding; the bound only turns a wedged
/// status bit into a reportable error.
pub const REGULATOR_POLL_LIMIT: u32 = 10_000;

/// Guarded-transition façade over the rail registers.
///
/// Stateless apart from the static configuration table, so it can be invoked
/// from either execution core without coordination; concurrent callers are
/// rejected by the dependency checks, not blocked.
#[derive(Copy, Clone)]
pub struct RailController {
    table: &'static RailTable,
}

impl RailController {
    /// Creates a controller over the given board rail table.
    #[must_use]
    pub const fn new(table: &'static RailTable) -> Self {
        Self { table }
    }

    /// Returns the board configuration table in use.
    #[must_use]
    pub const fn table(&self) -> &'static RailTable {
        self.table
    }

    /// Configures the *active* slot of a rail.
    ///
    /// # Errors
    ///
    /// Returns a [`RailError`] when the combination is illegal, a dependency
    /// is unmet, a dependant blocks a disable, or the regulator times out.
    pub fn set_rail_active<T: RailHw + StatusProbe>(
        &self,
        hw: &mut T,
        rail: RailId,
        enable: bool,
        voltage: Option<VoltageLevel>,
        max_load: Option<MaxLoad>,
    ) -> Result<(), RailError> {
        self.set_rail(hw, rail, PowerState::Active, enable, voltage, max_load)
    }

    /// Configures the *sleep* slot of a rail.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::set_rail_active`].
    pub fn set_rail_sleep<T: RailHw + StatusProbe>(
        &self,
        hw: &mut T,
        rail: RailId,
        enable: bool,
        voltage: Option<VoltageLevel>,
        max_load: Option<MaxLoad>,
    ) -> Result<(), RailError> {
        self.set_rail(hw, rail, PowerState::Sleep, enable, voltage, max_load)
    }

    /// Reads back the live configuration of one rail/state slot.
    ///
    /// Returns `None` when no source drives the slot.
    pub fn get_rail_config<H: RailHw>(
        &self,
        hw: &H,
        rail: RailId,
        state: PowerState,
    ) -> Option<RailConfig> {
        let spec = self.table.rail(rail);
        spec.options
            .iter()
            .filter(|option| option.allows_state(state))
            .find(|option| hw.source_enabled(rail, state, option.source))
            .map(|option| RailConfig {
                voltage: hw.voltage(rail, state),
                max_load: option.max_load,
                source: option.source,
            })
    }

    /// Applies one enable/disable request to a rail/state slot.
    ///
    /// # Errors
    ///
    /// See [`Self::set_rail_active`].
    pub fn set_rail<T: RailHw + StatusProbe>(
        &self,
        hw: &mut T,
        rail: RailId,
        state: PowerState,
        enable: bool,
        voltage: Option<VoltageLevel>,
        max_load: Option<MaxLoad>,
    ) -> Result<(), RailError> {
        if enable {
            self.enable_rail(hw, rail, state, voltage, max_load)
        } else {
            self.disable_rail(hw, rail, state)
        }
    }

    fn enable_rail<T: RailHw + StatusProbe>(
        &self,
        hw: &mut T,
        rail: RailId,
        state: PowerState,
        voltage: Option<VoltageLevel>,
        max_load: Option<MaxLoad>,
    ) -> Result<(), RailError> {
        let spec = self.table.rail(rail);
        let current = self.get_rail_config(hw, rail, state);
        let target_voltage = match (voltage, current) {
            (Some(requested), _) => requested,
            (None, Some(config)) => config.voltage,
            (None, None) => spec.default_voltage,
        };

        let option = spec
            .resolve(state, target_voltage, max_load)
            .ok_or(RailError::InvalidConfig)?;

        let requested = RailConfig {
            voltage: target_voltage,
            max_load: option.max_load,
            source: option.source,
        };
        // Re-applying the live configuration is a no-op by contract.
        if current == Some(requested) {
            return Ok(());
        }

        for requirement in rules::dependencies(rail, state, option.source) {
            if !requirement.holds(hw, state) {
                return Err(RailError::NotEnoughPower);
            }
        }

        self.program_voltage(hw, rail, state, target_voltage);
        hw.set_source(rail, state, option.source, true);
        // Never leave two sources driving one rail/state pair.
        for other in spec.options {
            if other.source != option.source && other.allows_state(state) {
                hw.set_source(rail, state, other.source, false);
            }
        }
        Self::wait_regulator_ok(hw, rail)
    }

    fn disable_rail<T: RailHw + StatusProbe>(
        &self,
        hw: &mut T,
        rail: RailId,
        state: PowerState,
    ) -> Result<(), RailError> {
        let spec = self.table.rail(rail);
        if self.get_rail_config(hw, rail, state).is_none() {
            return Ok(());
        }

        for blocker in rules::dependants(rail, state) {
            if blocker.condition.holds(&*hw, state) {
                return Err(blocker.reason);
            }
        }

        for option in spec.options {
            if option.allows_state(state) {
                hw.set_source(rail, state, option.source, false);
            }
        }
        Ok(())
    }

    /// Programs a voltage change honoring the level/trim ordering rule:
    /// raise the level before switching trim, lower trim before dropping the
    /// level, so dependent circuitry is never under- or over-driven.
    fn program_voltage<H: RailHw>(
        &self,
        hw: &mut H,
        rail: RailId,
        state: PowerState,
        target: VoltageLevel,
    ) {
        let current = hw.voltage(rail, state);
        if target == current {
            return;
        }
        if target > current {
            hw.set_voltage(rail, state, target);
            hw.apply_trim(rail, target);
        } else {
            hw.apply_trim(rail, target);
            hw.set_voltage(rail, state, target);
        }
    }

    fn wait_regulator_ok<H: RailHw>(hw: &H, rail: RailId) -> Result<(), RailError> {
        let mut budget = REGULATOR_POLL_LIMIT;
        while !hw.regulator_ok(rail) {
            budget = budget.checked_sub(1).ok_or(RailError::RegulatorTimeout)?;
            core::hint::spin_loop();
        }
        Ok(())
    }
}

impl Default for RailController {
    fn default() -> Self {
        Self::new(&BOARD_RAIL_TABLE)
    }
}
