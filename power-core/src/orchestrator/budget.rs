//! Sleep budget arithmetic.
//!
//! Decides, from a snapshot of the system, whether a sleep attempt may
//! proceed and for how many cycles the wake trigger must be armed. The
//! checks run in a fixed order so that every abort reason is deterministic
//! for a given snapshot; the computation is pure and can simply be redone
//! from scratch after an aborted attempt.

use core::fmt;

/// Why a sleep attempt was abandoned.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AbortReason {
    /// The effective mode votes forbid sleeping.
    ModeActive,
    /// A debugger is attached; powering down would drop the link.
    DebuggerAttached,
    /// Deferred maintenance work is queued for the idle loop.
    MaintenancePending,
    /// The remaining span is too short to be worth the entry/exit cost.
    BudgetTooSmall,
    /// The watchdog would expire before the system could feed it again.
    WatchdogImminent,
    /// A driver deferred sleeping until a later deadline.
    DeferBarrier,
    /// An adapter vetoed the attempt during the consent poll.
    AdapterRefused,
    /// An interrupt became pending after the adapters accepted.
    InterruptPending,
    /// A bus transfer that must not lose power is still running.
    TransferInProgress,
    /// A rail refused its sleep policy transition.
    RailFault,
}

impl AbortReason {
    /// Compact numeric code for transport.
    #[must_use]
    pub const fn as_raw(self) -> u16 {
        match self {
            AbortReason::ModeActive => 0,
            AbortReason::DebuggerAttached => 1,
            AbortReason::MaintenancePending => 2,
            AbortReason::BudgetTooSmall => 3,
            AbortReason::WatchdogImminent => 4,
            AbortReason::DeferBarrier => 5,
            AbortReason::AdapterRefused => 6,
            AbortReason::InterruptPending => 7,
            AbortReason::TransferInProgress => 8,
            AbortReason::RailFault => 9,
        }
    }

    /// Decodes a compact numeric code.
    #[must_use]
    pub const fn from_raw(code: u16) -> Option<Self> {
        match code {
            0 => Some(AbortReason::ModeActive),
            1 => Some(AbortReason::DebuggerAttached),
            2 => Some(AbortReason::MaintenancePending),
            3 => Some(AbortReason::BudgetTooSmall),
            4 => Some(AbortReason::WatchdogImminent),
            5 => Some(AbortReason::DeferBarrier),
            6 => Some(AbortReason::AdapterRefused),
            7 => Some(AbortReason::InterruptPending),
            8 => Some(AbortReason::TransferInProgress),
            9 => Some(AbortReason::RailFault),
            _ => None,
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AbortReason::ModeActive => "mode-active",
            AbortReason::DebuggerAttached => "debugger-attached",
            AbortReason::MaintenancePending => "maintenance-pending",
            AbortReason::BudgetTooSmall => "budget-too-small",
            AbortReason::WatchdogImminent => "watchdog-imminent",
            AbortReason::DeferBarrier => "defer-barrier",
            AbortReason::AdapterRefused => "adapter-refused",
            AbortReason::InterruptPending => "interrupt-pending",
            AbortReason::TransferInProgress => "transfer-in-progress",
            AbortReason::RailFault => "rail-fault",
        };
        f.write_str(name)
    }
}

/// Snapshot of everything the budget decision depends on.
#[derive(Copy, Clone, Debug)]
pub struct BudgetInputs {
    /// Ticks until the scheduler next needs the CPU, `None` for open-ended.
    pub requested_ticks: Option<u32>,
    /// Low-power clock cycles per scheduler tick.
    pub tick_period: u32,
    /// Cycles already elapsed inside the current tick.
    pub tick_offset: u32,
    /// Cycles the wake path needs before the scheduler can run again
    /// (regulator settling plus clock settling).
    pub wake_latency_cycles: u32,
    /// Longest sleep the watchdog budget permits.
    pub watchdog_limit: u32,
    /// Whether any task is watchdog-monitored. Bounds open-ended sleeps.
    pub watchdog_bounded: bool,
    /// Whether a defer barrier currently blocks powering down.
    pub barrier_blocks: bool,
    /// Summed adapter wake-side costs.
    pub adapter_cycles: u32,
    /// Shortest span worth powering down for.
    pub min_sleep_cycles: u32,
}

/// Verdict of the budget computation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BudgetOutcome {
    /// Do not sleep at all.
    Abort(AbortReason),
    /// Gate the core clock but keep the tick running and the power up.
    IdleOnly,
    /// Power down with the wake trigger armed this many cycles ahead.
    Sleep { cycles: u32 },
    /// Power down with no wake trigger; only an external event resumes.
    SleepUnbounded,
}

/// Runs the budget checks in their canonical order.
#[must_use]
pub fn compute(inputs: &BudgetInputs) -> BudgetOutcome {
    let mut cycles = match inputs.requested_ticks {
        Some(ticks) => {
            let span = ticks.saturating_mul(inputs.tick_period);
            // The current tick is already partially spent; waking on time
            // means sleeping that much less. Being past the deadline means
            // the scheduler is owed a tick right now.
            if inputs.tick_offset >= span {
                return BudgetOutcome::Abort(AbortReason::BudgetTooSmall);
            }
            Some(span - inputs.tick_offset)
        }
        None => None,
    };

    if let Some(span) = cycles {
        match span.checked_sub(inputs.wake_latency_cycles) {
            Some(remaining) => cycles = Some(remaining),
            None => return BudgetOutcome::Abort(AbortReason::BudgetTooSmall),
        }
    }

    // Watchdog: never sleep past the point where it could no longer be fed.
    // With monitored tasks even an open-ended sleep becomes bounded.
    match cycles {
        Some(span) if span > inputs.watchdog_limit => {
            if inputs.watchdog_limit == 0 {
                return BudgetOutcome::Abort(AbortReason::WatchdogImminent);
            }
            cycles = Some(inputs.watchdog_limit);
        }
        None if inputs.watchdog_bounded => {
            if inputs.watchdog_limit == 0 {
                return BudgetOutcome::Abort(AbortReason::WatchdogImminent);
            }
            cycles = Some(inputs.watchdog_limit);
        }
        _ => {}
    }

    if inputs.barrier_blocks {
        return BudgetOutcome::Abort(AbortReason::DeferBarrier);
    }

    if let Some(span) = cycles {
        let Some(remaining) = span.checked_sub(inputs.adapter_cycles) else {
            return BudgetOutcome::Abort(AbortReason::BudgetTooSmall);
        };
        if remaining < inputs.min_sleep_cycles {
            return BudgetOutcome::Abort(AbortReason::BudgetTooSmall);
        }
        // A span at or under one tick is cheaper to ride out with the tick
        // running than to pay the power-down round trip for.
        if remaining <= inputs.tick_period {
            return BudgetOutcome::IdleOnly;
        }
        return BudgetOutcome::Sleep { cycles: remaining };
    }

    BudgetOutcome::SleepUnbounded
}
