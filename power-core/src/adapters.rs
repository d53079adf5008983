//! Driver adapters that participate in sleep entry and wake-up.
//!
//! An adapter is the power-management face of a driver: it can veto a sleep
//! attempt at the last moment, declares how many cycles its wake-side
//! reinitialization costs, and receives the wake callbacks. Registration is
//! slot-based with a compile-time capacity, matching the fixed set of
//! drivers a build links in.

/// Sleep/wake participation hooks for one driver.
///
/// All hooks default to no-ops so a driver only implements what it needs.
pub trait PowerAdapter {
    /// Last-moment consent to power down. Returning `false` vetoes the
    /// whole sleep attempt.
    fn prepare_for_sleep(&mut self) -> bool {
        true
    }

    /// A sleep attempt this adapter already accepted was abandoned.
    fn sleep_canceled(&mut self) {}

    /// The system woke from a powered-down sleep.
    fn wake_up(&mut self) {}

    /// The accurate clock finished settling after wake-up.
    fn clock_ready(&mut self) {}
}

/// Opaque handle identifying one registered adapter.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdapterHandle(u8);

/// All adapter slots are taken.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegistryFull;

struct Entry<'a> {
    adapter: &'a mut dyn PowerAdapter,
    /// Wake-side reinitialization cost in low-power clock cycles.
    prep_cycles: u32,
}

/// Fixed-capacity adapter registry.
///
/// Adapters are polled in registration order on the way into sleep and in
/// reverse order when an accepted attempt has to be unwound, so a driver
/// never sees a cancel before its own accept.
pub struct AdapterRegistry<'a, const N: usize> {
    slots: [Option<Entry<'a>>; N],
}

impl<'a, const N: usize> AdapterRegistry<'a, N> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: [const { None }; N],
        }
    }

    /// Registers an adapter with its wake-side cost.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryFull`] when all slots are taken.
    pub fn register(
        &mut self,
        adapter: &'a mut dyn PowerAdapter,
        prep_cycles: u32,
    ) -> Result<AdapterHandle, RegistryFull> {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(Entry {
                    adapter,
                    prep_cycles,
                });
                #[allow(clippy::cast_possible_truncation)]
                return Ok(AdapterHandle(index as u8));
            }
        }
        Err(RegistryFull)
    }

    /// Removes an adapter. Its handle becomes reusable.
    pub fn unregister(&mut self, handle: AdapterHandle) {
        if let Some(slot) = self.slots.get_mut(usize::from(handle.0)) {
            *slot = None;
        }
    }

    /// Summed wake-side cost of every registered adapter.
    #[must_use]
    pub fn total_prep_cycles(&self) -> u32 {
        self.slots
            .iter()
            .flatten()
            .fold(0, |acc, entry| acc.saturating_add(entry.prep_cycles))
    }

    /// Asks every adapter for sleep consent, in registration order.
    ///
    /// # Errors
    ///
    /// On the first refusal, every adapter that already accepted is told the
    /// attempt was canceled (in reverse order) and the refusing handle is
    /// returned.
    pub fn poll_prepare(&mut self) -> Result<(), AdapterHandle> {
        for index in 0..N {
            let accepted = match &mut self.slots[index] {
                Some(entry) => entry.adapter.prepare_for_sleep(),
                None => continue,
            };
            if !accepted {
                self.cancel_below(index);
                #[allow(clippy::cast_possible_truncation)]
                return Err(AdapterHandle(index as u8));
            }
        }
        Ok(())
    }

    /// Tells every adapter a fully accepted attempt was abandoned.
    pub fn notify_canceled(&mut self) {
        self.cancel_below(N);
    }

    /// Wake-up fan-out, in registration order.
    pub fn notify_wake(&mut self) {
        for entry in self.slots.iter_mut().flatten() {
            entry.adapter.wake_up();
        }
    }

    /// Clock-settled fan-out, in registration order.
    pub fn notify_clock_ready(&mut self) {
        for entry in self.slots.iter_mut().flatten() {
            entry.adapter.clock_ready();
        }
    }

    fn cancel_below(&mut self, limit: usize) {
        for slot in self.slots[..limit].iter_mut().rev() {
            if let Some(entry) = slot {
                entry.adapter.sleep_canceled();
            }
        }
    }
}

impl<const N: usize> Default for AdapterRegistry<'_, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Deadline before which the system must not power down.
///
/// Drivers mid-transaction push the deadline out; deadlines only ever move
/// forward, and a deadline further out than the permitted maximum is treated
/// as stale and dropped, so a driver that died mid-defer cannot pin the
/// system awake forever.
#[derive(Debug, Default)]
pub struct SleepBarrier {
    blocked_until: Option<u64>,
}

impl SleepBarrier {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            blocked_until: None,
        }
    }

    /// Extends the no-sleep deadline. Earlier deadlines are kept.
    pub fn defer_until(&mut self, deadline: u64) {
        self.blocked_until = Some(match self.blocked_until {
            Some(current) => current.max(deadline),
            None => deadline,
        });
    }

    /// Reports whether sleeping is currently blocked, expiring passed or
    /// stale deadlines as a side effect.
    pub fn blocks(&mut self, now: u64, max_defer: u64) -> bool {
        match self.blocked_until {
            None => false,
            Some(deadline) if deadline <= now || deadline > now.saturating_add(max_defer) => {
                self.blocked_until = None;
                false
            }
            Some(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::RefCell;
    use heapless::Vec;

    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    enum Call {
        Prepare(char),
        Canceled(char),
        Wake(char),
        ClockReady(char),
    }

    struct Probe<'a> {
        tag: char,
        accept: bool,
        log: &'a RefCell<Vec<Call, 16>>,
    }

    impl Probe<'_> {
        fn push(&self, call: Call) {
            self.log.borrow_mut().push(call).unwrap();
        }
    }

    impl PowerAdapter for Probe<'_> {
        fn prepare_for_sleep(&mut self) -> bool {
            self.push(Call::Prepare(self.tag));
            self.accept
        }

        fn sleep_canceled(&mut self) {
            self.push(Call::Canceled(self.tag));
        }

        fn wake_up(&mut self) {
            self.push(Call::Wake(self.tag));
        }

        fn clock_ready(&mut self) {
            self.push(Call::ClockReady(self.tag));
        }
    }

    #[test]
    fn refusal_cancels_earlier_accepts_in_reverse() {
        let log = RefCell::new(Vec::new());
        let mut a = Probe { tag: 'a', accept: true, log: &log };
        let mut b = Probe { tag: 'b', accept: true, log: &log };
        let mut c = Probe { tag: 'c', accept: false, log: &log };

        let mut registry: AdapterRegistry<'_, 4> = AdapterRegistry::new();
        registry.register(&mut a, 1).unwrap();
        registry.register(&mut b, 2).unwrap();
        let refused = registry.register(&mut c, 3).unwrap();

        assert_eq!(registry.poll_prepare(), Err(refused));
        assert_eq!(
            log.borrow().as_slice(),
            &[
                Call::Prepare('a'),
                Call::Prepare('b'),
                Call::Prepare('c'),
                Call::Canceled('b'),
                Call::Canceled('a'),
            ],
        );
    }

    #[test]
    fn wake_fans_out_in_registration_order() {
        let log = RefCell::new(Vec::new());
        let mut a = Probe { tag: 'a', accept: true, log: &log };
        let mut b = Probe { tag: 'b', accept: true, log: &log };

        let mut registry: AdapterRegistry<'_, 4> = AdapterRegistry::new();
        registry.register(&mut a, 0).unwrap();
        registry.register(&mut b, 0).unwrap();
        registry.notify_wake();
        registry.notify_clock_ready();

        assert_eq!(
            log.borrow().as_slice(),
            &[
                Call::Wake('a'),
                Call::Wake('b'),
                Call::ClockReady('a'),
                Call::ClockReady('b'),
            ],
        );
    }

    #[test]
    fn unregistered_slot_is_reused() {
        let log = RefCell::new(Vec::new());
        let mut a = Probe { tag: 'a', accept: true, log: &log };
        let mut b = Probe { tag: 'b', accept: true, log: &log };

        let mut c = Probe { tag: 'c', accept: true, log: &log };

        let mut registry: AdapterRegistry<'_, 1> = AdapterRegistry::new();
        let handle = registry.register(&mut a, 5).unwrap();
        assert!(registry.register(&mut b, 5).is_err());
        registry.unregister(handle);
        registry.register(&mut c, 7).unwrap();
        assert_eq!(registry.total_prep_cycles(), 7);
    }

    #[test]
    fn barrier_keeps_the_latest_deadline() {
        let mut barrier = SleepBarrier::new();
        barrier.defer_until(100);
        barrier.defer_until(50);
        assert!(barrier.blocks(80, 1000));
        assert!(!barrier.blocks(100, 1000));
    }

    #[test]
    fn stale_deadline_is_dropped() {
        let mut barrier = SleepBarrier::new();
        barrier.defer_until(10_000);
        assert!(!barrier.blocks(0, 1000));
        // Dropped for good, not merely ignored once.
        assert!(!barrier.blocks(5, 1000));
    }
}
