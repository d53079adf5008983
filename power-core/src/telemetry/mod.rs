//! Power event catalog and the in-memory ring that retains it.
//!
//! Every sleep attempt leaves a trace here whether it succeeds or not, so
//! the console can answer "why did the system not sleep" after the fact.
//! Event kinds encode to compact numeric codes for transport over
//! diagnostics channels and stay `no_std` compatible.

use core::fmt;

use heapless::{HistoryBuf, OldestOrdered};

use crate::orchestrator::{AbortReason, SleepMode};
use crate::rails::{RailError, RailId};

/// Monotonic identifier assigned to each recorded event.
pub type EventId = u32;

/// Canonical timestamp units for power records (low-power clock cycles).
pub type TimestampCycles = u64;

/// Discriminated power events shared across all targets.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerEventKind {
    /// The system committed to a powered-down sleep.
    SleepEntered(SleepMode),
    /// A sleep attempt was abandoned before power-down.
    SleepAborted(AbortReason),
    /// The system resumed execution after a powered-down sleep.
    WakeCompleted,
    /// A rail transition failed while applying a sleep policy.
    RailFault(RailId),
    /// Implementation-specific extension.
    Custom(u16),
}

impl fmt::Display for PowerEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerEventKind::SleepEntered(mode) => write!(f, "sleep-entered {mode}"),
            PowerEventKind::SleepAborted(reason) => write!(f, "sleep-aborted {reason}"),
            PowerEventKind::WakeCompleted => f.write_str("wake-completed"),
            PowerEventKind::RailFault(rail) => write!(f, "rail-fault {rail:?}"),
            PowerEventKind::Custom(code) => write!(f, "custom({code})"),
        }
    }
}

impl PowerEventKind {
    const SLEEP_ENTERED_BASE: u16 = 0x0000;
    const SLEEP_ABORTED_BASE: u16 = 0x0010;
    const WAKE_COMPLETED_CODE: u16 = 0x0020;
    const RAIL_FAULT_BASE: u16 = 0x0030;

    /// Encodes the event into a compact transport-friendly discriminant.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn to_raw(self) -> u16 {
        match self {
            PowerEventKind::SleepEntered(mode) => Self::SLEEP_ENTERED_BASE + mode.as_raw(),
            PowerEventKind::SleepAborted(reason) => Self::SLEEP_ABORTED_BASE + reason.as_raw(),
            PowerEventKind::WakeCompleted => Self::WAKE_COMPLETED_CODE,
            PowerEventKind::RailFault(rail) => Self::RAIL_FAULT_BASE + rail.as_index() as u16,
            PowerEventKind::Custom(code) => code,
        }
    }

    /// Decodes a raw discriminant, falling back to [`PowerEventKind::Custom`].
    #[must_use]
    pub fn from_raw(code: u16) -> Self {
        match code {
            Self::WAKE_COMPLETED_CODE => PowerEventKind::WakeCompleted,
            value if (Self::SLEEP_ENTERED_BASE..Self::SLEEP_ABORTED_BASE).contains(&value) => {
                SleepMode::from_raw(value - Self::SLEEP_ENTERED_BASE)
                    .map_or(PowerEventKind::Custom(value), PowerEventKind::SleepEntered)
            }
            value if (Self::SLEEP_ABORTED_BASE..Self::WAKE_COMPLETED_CODE).contains(&value) => {
                AbortReason::from_raw(value - Self::SLEEP_ABORTED_BASE)
                    .map_or(PowerEventKind::Custom(value), PowerEventKind::SleepAborted)
            }
            value if (Self::RAIL_FAULT_BASE..Self::RAIL_FAULT_BASE + 6).contains(&value) => {
                RailId::from_index(usize::from(value - Self::RAIL_FAULT_BASE))
                    .map_or(PowerEventKind::Custom(value), PowerEventKind::RailFault)
            }
            other => PowerEventKind::Custom(other),
        }
    }
}

/// Payloads carried alongside power events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PowerPayload {
    /// No additional metadata accompanies the event.
    None,
    /// Budget details of a committed sleep.
    Sleep(SleepTelemetry),
    /// Summary of a completed wake.
    Wake(WakeTelemetry),
    /// Details of a failed rail transition.
    RailFault(RailFaultTelemetry),
}

/// Budget details recorded when a sleep is committed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SleepTelemetry {
    pub mode: SleepMode,
    /// Armed sleep span in low-power cycles, `None` for open-ended sleeps.
    pub sleep_cycles: Option<u32>,
}

/// Summary recorded when a powered-down sleep completes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct WakeTelemetry {
    /// Whole scheduler ticks that elapsed while powered down.
    pub slept_ticks: u32,
}

/// Details recorded when a rail transition fails during sleep entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RailFaultTelemetry {
    pub rail: RailId,
    pub error: RailError,
}

/// Total number of power records retained in memory.
pub const POWER_RING_CAPACITY: usize = 64;

/// Power record stored in the ring buffer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PowerRecord {
    pub id: EventId,
    pub timestamp: TimestampCycles,
    pub event: PowerEventKind,
    pub details: PowerPayload,
}

/// Records power events into a fixed-size ring buffer.
pub struct PowerRecorder<const CAPACITY: usize = POWER_RING_CAPACITY> {
    ring: HistoryBuf<PowerRecord, CAPACITY>,
    next_event_id: EventId,
}

impl<const CAPACITY: usize> PowerRecorder<CAPACITY> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the recorded events in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, PowerRecord> {
        self.ring.oldest_ordered()
    }

    /// Returns the most recent record, if available.
    #[must_use]
    pub fn latest(&self) -> Option<&PowerRecord> {
        self.ring.recent()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Records a committed sleep with its budget details.
    pub fn record_sleep_entered(
        &mut self,
        mode: SleepMode,
        sleep_cycles: Option<u32>,
        timestamp: TimestampCycles,
    ) -> EventId {
        self.record(
            PowerEventKind::SleepEntered(mode),
            PowerPayload::Sleep(SleepTelemetry { mode, sleep_cycles }),
            timestamp,
        )
    }

    /// Records an abandoned sleep attempt.
    pub fn record_sleep_aborted(
        &mut self,
        reason: AbortReason,
        timestamp: TimestampCycles,
    ) -> EventId {
        self.record(
            PowerEventKind::SleepAborted(reason),
            PowerPayload::None,
            timestamp,
        )
    }

    /// Records a completed wake and how long the system was down.
    pub fn record_wake(&mut self, slept_ticks: u32, timestamp: TimestampCycles) -> EventId {
        self.record(
            PowerEventKind::WakeCompleted,
            PowerPayload::Wake(WakeTelemetry { slept_ticks }),
            timestamp,
        )
    }

    /// Records a rail transition failure seen during sleep entry.
    pub fn record_rail_fault(
        &mut self,
        rail: RailId,
        error: RailError,
        timestamp: TimestampCycles,
    ) -> EventId {
        self.record(
            PowerEventKind::RailFault(rail),
            PowerPayload::RailFault(RailFaultTelemetry { rail, error }),
            timestamp,
        )
    }

    /// Records an arbitrary event with the supplied payload.
    pub fn record(
        &mut self,
        event: PowerEventKind,
        details: PowerPayload,
        timestamp: TimestampCycles,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);
        self.ring.write(PowerRecord {
            id,
            timestamp,
            event,
            details,
        });
        id
    }
}

impl<const CAPACITY: usize> Default for PowerRecorder<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}
