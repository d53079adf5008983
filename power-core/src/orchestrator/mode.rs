//! Sleep mode catalog and the vote machinery that selects one.
//!
//! Subsystems vote for the deepest mode they can tolerate; the effective
//! mode is the shallowest among the user default and every outstanding
//! vote, so a single busy subsystem holds the whole system at its level.

use core::fmt;

/// Sleep depth, ordered shallow to deep.
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SleepMode {
    /// Stay awake; sleep attempts abort immediately.
    Active,
    /// Core clock gated, all rails untouched, tick keeps running.
    Idle,
    /// Rails drop to their sleep slots, wake timer restarts the system.
    ExtendedSleep,
    /// Retention-only rails, accurate clocks lost across the sleep.
    DeepSleep,
    /// Everything off except the wake pins; effectively a cold boot.
    Hibernation,
}

/// All modes, shallow to deep.
pub const ALL_MODES: [SleepMode; 5] = [
    SleepMode::Active,
    SleepMode::Idle,
    SleepMode::ExtendedSleep,
    SleepMode::DeepSleep,
    SleepMode::Hibernation,
];

impl SleepMode {
    /// Compact numeric code for transport.
    #[must_use]
    pub const fn as_raw(self) -> u16 {
        match self {
            SleepMode::Active => 0,
            SleepMode::Idle => 1,
            SleepMode::ExtendedSleep => 2,
            SleepMode::DeepSleep => 3,
            SleepMode::Hibernation => 4,
        }
    }

    /// Decodes a compact numeric code.
    #[must_use]
    pub const fn from_raw(code: u16) -> Option<Self> {
        match code {
            0 => Some(SleepMode::Active),
            1 => Some(SleepMode::Idle),
            2 => Some(SleepMode::ExtendedSleep),
            3 => Some(SleepMode::DeepSleep),
            4 => Some(SleepMode::Hibernation),
            _ => None,
        }
    }

    /// Whether this mode powers the system down rather than merely gating
    /// the core clock.
    #[must_use]
    pub const fn powers_down(self) -> bool {
        matches!(
            self,
            SleepMode::ExtendedSleep | SleepMode::DeepSleep | SleepMode::Hibernation
        )
    }
}

impl fmt::Display for SleepMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SleepMode::Active => "active",
            SleepMode::Idle => "idle",
            SleepMode::ExtendedSleep => "extended",
            SleepMode::DeepSleep => "deep",
            SleepMode::Hibernation => "hibernation",
        };
        f.write_str(name)
    }
}

/// Outstanding mode votes plus the user default.
#[derive(Debug)]
pub struct ModeVotes {
    counts: [u8; 5],
    user: SleepMode,
}

impl ModeVotes {
    #[must_use]
    pub const fn new(user: SleepMode) -> Self {
        Self {
            counts: [0; 5],
            user,
        }
    }

    /// Adds one vote for `mode`. Votes nest; each request needs a matching
    /// release.
    pub fn request(&mut self, mode: SleepMode) {
        let slot = &mut self.counts[usize::from(mode.as_raw())];
        *slot = slot.saturating_add(1);
    }

    /// Drops one vote for `mode`. A release without a matching request is
    /// ignored.
    pub fn release(&mut self, mode: SleepMode) {
        let slot = &mut self.counts[usize::from(mode.as_raw())];
        *slot = slot.saturating_sub(1);
    }

    /// Replaces the user default mode.
    pub fn set_user(&mut self, mode: SleepMode) {
        self.user = mode;
    }

    /// The user default mode.
    #[must_use]
    pub const fn user(&self) -> SleepMode {
        self.user
    }

    /// The mode the system may actually sleep in right now.
    #[must_use]
    pub fn effective(&self) -> SleepMode {
        ALL_MODES
            .iter()
            .copied()
            .find(|mode| self.counts[usize::from(mode.as_raw())] > 0)
            .map_or(self.user, |voted| voted.min(self.user))
    }
}
