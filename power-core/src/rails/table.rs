//! Static per-board rail configuration catalog.
//!
//! The table is pure data: which sources can drive each rail, at which
//! voltage levels, with which load limits, in which power states, and how
//! long each combination takes to settle. [`RailController`](super::RailController)
//! consults it to validate requests and to map a voltage/load pair back to
//! the unique source able to satisfy it.

use super::{MaxLoad, PowerState, RailId, SourceType, VoltageLevel};

/// One legal way of driving a rail.
#[derive(Copy, Clone, Debug)]
pub struct SourceOption {
    pub source: SourceType,
    /// Voltage levels this source can produce on this rail.
    pub voltages: &'static [VoltageLevel],
    pub max_load: MaxLoad,
    /// Power states in which this source may drive the rail.
    pub states: &'static [PowerState],
    /// Settling latency of this source in low-power clock cycles.
    pub settle_cycles: u32,
}

impl SourceOption {
    pub(crate) fn allows_state(&self, state: PowerState) -> bool {
        self.states.contains(&state)
    }

    fn allows_voltage(&self, voltage: VoltageLevel) -> bool {
        self.voltages.contains(&voltage)
    }

    fn satisfies_load(&self, load: Option<MaxLoad>) -> bool {
        load.is_none_or(|requested| self.max_load >= requested)
    }
}

/// Full description of one rail.
#[derive(Copy, Clone, Debug)]
pub struct RailSpec {
    pub id: RailId,
    pub name: &'static str,
    pub options: &'static [SourceOption],
    /// Voltage applied when an enable request names none.
    pub default_voltage: VoltageLevel,
}

impl RailSpec {
    /// Maps a requested voltage/load/state triple to its source option.
    ///
    /// Options are listed least-capable first, so the first match is the
    /// cheapest source able to satisfy the request. `None` means the
    /// combination is illegal for this rail.
    #[must_use]
    pub fn resolve(
        &self,
        state: PowerState,
        voltage: VoltageLevel,
        load: Option<MaxLoad>,
    ) -> Option<&'static SourceOption> {
        self.options.iter().find(|option| {
            option.allows_state(state) && option.allows_voltage(voltage) && option.satisfies_load(load)
        })
    }
}

/// Board-level rail catalog, indexable by [`RailId`].
#[derive(Debug)]
pub struct RailTable {
    rails: [RailSpec; 6],
}

impl RailTable {
    #[must_use]
    pub fn rail(&self, id: RailId) -> &RailSpec {
        &self.rails[id.as_index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &RailSpec> {
        self.rails.iter()
    }
}

const ACTIVE_ONLY: &[PowerState] = &[PowerState::Active];
const SLEEP_ONLY: &[PowerState] = &[PowerState::Sleep];
const BOTH_STATES: &[PowerState] = &[PowerState::Active, PowerState::Sleep];

/// Default rail catalog for the reference board.
pub static BOARD_RAIL_TABLE: RailTable = RailTable {
    rails: [
        RailSpec {
            id: RailId::V12,
            name: "V12",
            options: &[
                SourceOption {
                    source: SourceType::Clamp,
                    voltages: &[VoltageLevel::V0_75],
                    max_load: MaxLoad::MicroAmp1,
                    states: SLEEP_ONLY,
                    settle_cycles: 0,
                },
                SourceOption {
                    source: SourceType::LdoLowRipple,
                    voltages: &[VoltageLevel::V0_75, VoltageLevel::V0_90],
                    max_load: MaxLoad::MilliAmp20,
                    states: BOTH_STATES,
                    settle_cycles: 2,
                },
                SourceOption {
                    source: SourceType::DcdcHighEfficiency,
                    voltages: &[VoltageLevel::V0_75, VoltageLevel::V0_90, VoltageLevel::V1_20],
                    max_load: MaxLoad::MilliAmp150,
                    states: ACTIVE_ONLY,
                    settle_cycles: 6,
                },
            ],
            default_voltage: VoltageLevel::V0_90,
        },
        RailSpec {
            id: RailId::V14,
            name: "V14",
            options: &[SourceOption {
                source: SourceType::DcdcHighEfficiency,
                voltages: &[VoltageLevel::V1_20, VoltageLevel::V1_40],
                max_load: MaxLoad::MilliAmp50,
                states: ACTIVE_ONLY,
                settle_cycles: 6,
            }],
            default_voltage: VoltageLevel::V1_40,
        },
        RailSpec {
            id: RailId::V18,
            name: "V18",
            options: &[
                SourceOption {
                    source: SourceType::LdoLowRipple,
                    voltages: &[VoltageLevel::V1_80],
                    max_load: MaxLoad::MilliAmp20,
                    states: BOTH_STATES,
                    settle_cycles: 2,
                },
                SourceOption {
                    source: SourceType::DcdcHighEfficiency,
                    voltages: &[VoltageLevel::V1_80],
                    max_load: MaxLoad::MilliAmp150,
                    states: ACTIVE_ONLY,
                    settle_cycles: 6,
                },
            ],
            default_voltage: VoltageLevel::V1_80,
        },
        RailSpec {
            id: RailId::V18P,
            name: "V18P",
            options: &[
                SourceOption {
                    source: SourceType::LdoLowRipple,
                    voltages: &[VoltageLevel::V1_80],
                    max_load: MaxLoad::MilliAmp20,
                    states: BOTH_STATES,
                    settle_cycles: 2,
                },
                SourceOption {
                    source: SourceType::DcdcHighEfficiency,
                    voltages: &[VoltageLevel::V1_80],
                    max_load: MaxLoad::MilliAmp50,
                    states: ACTIVE_ONLY,
                    settle_cycles: 6,
                },
            ],
            default_voltage: VoltageLevel::V1_80,
        },
        RailSpec {
            id: RailId::V18F,
            name: "V18F",
            options: &[SourceOption {
                source: SourceType::PassThrough,
                voltages: &[VoltageLevel::V1_80],
                max_load: MaxLoad::MilliAmp50,
                states: BOTH_STATES,
                settle_cycles: 1,
            }],
            default_voltage: VoltageLevel::V1_80,
        },
        RailSpec {
            id: RailId::V30,
            name: "V30",
            options: &[
                SourceOption {
                    source: SourceType::Clamp,
                    voltages: &[VoltageLevel::V3_00],
                    max_load: MaxLoad::MicroAmp1,
                    states: SLEEP_ONLY,
                    settle_cycles: 0,
                },
                SourceOption {
                    source: SourceType::LdoLowRipple,
                    voltages: &[VoltageLevel::V3_00, VoltageLevel::V3_30],
                    max_load: MaxLoad::MilliAmp150,
                    states: BOTH_STATES,
                    settle_cycles: 3,
                },
            ],
            default_voltage: VoltageLevel::V3_00,
        },
    ],
};
