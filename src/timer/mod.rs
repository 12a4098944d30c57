//! Timer Wheel
//!
//! A hashed timing wheel owned by one node. Every protocol timer
//! (hello, listen, designated router delay, routing updates, relay
//! timeouts) is a token in this wheel; the dispatcher advances the wheel
//! on a periodic tick and handles the expired tokens as work, in the same
//! serialized stream as received frames.
//!
//! Insertion and expiry are O(1) amortized: timeouts shorter than one
//! revolution go straight into a slot, longer ones wait in an overflow
//! list that is cascaded into the slots once per revolution.
//!
//! A token has at most one live timer. Restarting or cancelling a token
//! bumps its logical generation without touching the wheel; the old
//! physical entry is discarded as stale when its slot comes around.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

/// Default number of slots.
pub const DEFAULT_SLOTS: usize = 1024;

/// Default tick resolution.
pub const DEFAULT_TICK: Duration = Duration::from_millis(100);

/// A started timer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimerHandle<T> {
    /// Absolute expiry, in ticks since the wheel was created.
    pub deadline: u64,
    pub token: T,
    pub generation: u64,
}

#[derive(Clone, Debug)]
struct Entry<T> {
    token: T,
    generation: u64,
    deadline: u64,
}

#[derive(Clone, Copy, Debug)]
struct Armed {
    generation: u64,
    deadline: u64,
}

/// Wheel statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimerStats {
    pub started: u64,
    pub fired: u64,
    pub cancelled: u64,
    /// Physical entries dropped because their generation was outdated.
    pub stale: u64,
}

/// Hashed timing wheel keyed by owner tokens.
pub struct TimerWheel<T> {
    slots: Vec<Vec<Entry<T>>>,
    overflow: Vec<Entry<T>>,
    current: u64,
    tick: Duration,
    armed: HashMap<T, Armed>,
    next_generation: u64,
    stats: TimerStats,
}

impl<T: Clone + Eq + Hash> TimerWheel<T> {
    /// Create a wheel of `slots` buckets advanced every `tick`.
    pub fn new(slots: usize, tick: Duration) -> Self {
        let slots = slots.max(1);
        let tick = if tick.is_zero() { DEFAULT_TICK } else { tick };
        Self {
            slots: (0..slots).map(|_| Vec::new()).collect(),
            overflow: Vec::new(),
            current: 0,
            tick,
            armed: HashMap::new(),
            next_generation: 1,
            stats: TimerStats::default(),
        }
    }

    /// Tick resolution.
    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Ticks elapsed since creation.
    pub fn now(&self) -> u64 {
        self.current
    }

    /// Number of live timers.
    pub fn len(&self) -> usize {
        self.armed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }

    pub fn stats(&self) -> TimerStats {
        self.stats
    }

    fn ticks_for(&self, timeout: Duration) -> u64 {
        let tick = self.tick.as_nanos();
        let ticks = timeout.as_nanos().div_ceil(tick);
        u64::try_from(ticks).unwrap_or(u64::MAX).max(1)
    }

    fn place(&mut self, entry: Entry<T>) {
        let n = self.slots.len() as u64;
        if entry.deadline - self.current < n {
            let idx = (entry.deadline % n) as usize;
            self.slots[idx].push(entry);
        } else {
            self.overflow.push(entry);
        }
    }

    /// Start (or restart) the timer for `token`. Any earlier timer for the
    /// same token is invalidated.
    pub fn start(&mut self, token: T, timeout: Duration) -> TimerHandle<T> {
        let deadline = self.current.saturating_add(self.ticks_for(timeout));
        let generation = self.next_generation;
        self.next_generation += 1;
        self.armed.insert(
            token.clone(),
            Armed {
                generation,
                deadline,
            },
        );
        self.place(Entry {
            token: token.clone(),
            generation,
            deadline,
        });
        self.stats.started += 1;
        TimerHandle {
            deadline,
            token,
            generation,
        }
    }

    /// Cancel the timer for `token`. Returns true if one was running.
    pub fn cancel(&mut self, token: &T) -> bool {
        let was_armed = self.armed.remove(token).is_some();
        if was_armed {
            self.stats.cancelled += 1;
        }
        was_armed
    }

    /// Cancel every timer whose token matches `pred`.
    pub fn cancel_where(&mut self, mut pred: impl FnMut(&T) -> bool) -> usize {
        let before = self.armed.len();
        self.armed.retain(|token, _| !pred(token));
        let removed = before - self.armed.len();
        self.stats.cancelled += removed as u64;
        removed
    }

    /// True if `token` has a live timer.
    pub fn is_armed(&self, token: &T) -> bool {
        self.armed.contains_key(token)
    }

    /// True if `handle` is still the live timer for its token.
    pub fn is_current(&self, handle: &TimerHandle<T>) -> bool {
        self.armed
            .get(&handle.token)
            .is_some_and(|a| a.generation == handle.generation)
    }

    /// Time left on the timer for `token`.
    pub fn remaining(&self, token: &T) -> Option<Duration> {
        self.armed.get(token).map(|a| {
            let ticks = a.deadline.saturating_sub(self.current);
            let nanos = self.tick.as_nanos() * ticks as u128;
            u64::try_from(nanos)
                .map(Duration::from_nanos)
                .unwrap_or(Duration::MAX)
        })
    }

    fn cascade(&mut self) {
        let n = self.slots.len() as u64;
        let pending = std::mem::take(&mut self.overflow);
        for entry in pending {
            match self.armed.get(&entry.token) {
                Some(a) if a.generation == entry.generation => {
                    if entry.deadline - self.current < n {
                        let idx = (entry.deadline % n) as usize;
                        self.slots[idx].push(entry);
                    } else {
                        self.overflow.push(entry);
                    }
                }
                _ => self.stats.stale += 1,
            }
        }
    }

    /// Advance one tick and return the tokens that expired.
    pub fn advance(&mut self) -> Vec<T> {
        self.current += 1;
        let n = self.slots.len() as u64;
        if self.current % n == 0 {
            self.cascade();
        }
        let idx = (self.current % n) as usize;
        let slot = std::mem::take(&mut self.slots[idx]);
        let mut expired = Vec::new();
        for entry in slot {
            if entry.deadline > self.current {
                self.slots[idx].push(entry);
                continue;
            }
            let live = self
                .armed
                .get(&entry.token)
                .is_some_and(|a| a.generation == entry.generation);
            if live {
                self.armed.remove(&entry.token);
                self.stats.fired += 1;
                expired.push(entry.token);
            } else {
                self.stats.stale += 1;
            }
        }
        expired
    }

    /// Advance `ticks` ticks, collecting all expirations in order.
    pub fn advance_by(&mut self, ticks: u64) -> Vec<T> {
        let mut expired = Vec::new();
        for _ in 0..ticks {
            expired.extend(self.advance());
        }
        expired
    }

    /// Advance by at least `elapsed` worth of ticks.
    pub fn advance_duration(&mut self, elapsed: Duration) -> Vec<T> {
        let ticks = elapsed.as_nanos() / self.tick.as_nanos();
        self.advance_by(ticks as u64)
    }
}

impl<T: Clone + Eq + Hash> Default for TimerWheel<T> {
    fn default() -> Self {
        Self::new(DEFAULT_SLOTS, DEFAULT_TICK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn wheel() -> TimerWheel<u32> {
        TimerWheel::new(16, Duration::from_millis(100))
    }

    #[test]
    fn test_fires_at_deadline() {
        let mut w = wheel();
        w.start(1, Duration::from_millis(300));
        assert_eq!(w.advance_by(2), Vec::<u32>::new());
        assert_eq!(w.advance(), vec![1]);
        assert!(!w.is_armed(&1));
        assert_eq!(w.advance_by(20), Vec::<u32>::new());
    }

    #[test]
    fn test_minimum_one_tick() {
        let mut w = wheel();
        w.start(7, Duration::ZERO);
        assert_eq!(w.advance(), vec![7]);
    }

    #[test]
    fn test_partial_tick_rounds_up() {
        let mut w = wheel();
        w.start(1, Duration::from_millis(150));
        assert!(w.advance().is_empty());
        assert_eq!(w.advance(), vec![1]);
    }

    #[test]
    fn test_cancel_discards_stale_entry() {
        let mut w = wheel();
        let handle = w.start(1, Duration::from_millis(200));
        assert!(w.is_current(&handle));
        assert!(w.cancel(&1));
        assert!(!w.is_current(&handle));
        assert!(w.advance_by(5).is_empty());
        assert_eq!(w.stats().stale, 1);
        assert!(!w.cancel(&1));
    }

    #[test]
    fn test_restart_invalidates_previous() {
        let mut w = wheel();
        let first = w.start(1, Duration::from_millis(200));
        let second = w.start(1, Duration::from_millis(500));
        assert!(!w.is_current(&first));
        assert!(w.is_current(&second));
        assert!(w.advance_by(4).is_empty());
        assert_eq!(w.advance(), vec![1]);
        assert_eq!(w.len(), 0);
    }

    #[test]
    fn test_overflow_cascade() {
        let mut w = wheel();
        // 16 slots of 100ms: 4 seconds is 40 ticks, two and a half turns
        w.start(1, Duration::from_secs(4));
        w.start(2, Duration::from_millis(1600));
        let mut fired = Vec::new();
        for tick in 1..=50u64 {
            for token in w.advance() {
                fired.push((tick, token));
            }
        }
        assert_eq!(fired, vec![(16, 2), (40, 1)]);
    }

    #[test]
    fn test_remaining_and_cancel_where() {
        let mut w = wheel();
        w.start(1, Duration::from_secs(1));
        w.start(2, Duration::from_secs(2));
        w.start(3, Duration::from_secs(3));
        w.advance_by(2);
        assert_eq!(w.remaining(&1), Some(Duration::from_millis(800)));
        assert_eq!(w.cancel_where(|t| *t >= 2), 2);
        assert_eq!(w.len(), 1);
        assert_eq!(w.advance_by(40), vec![1]);
    }

    #[test]
    fn test_remaining_for_long_deadline() {
        let mut w = wheel();
        // more ticks than fit in a u32
        let long = Duration::from_secs(500_000_000);
        w.start(1, long);
        assert_eq!(w.remaining(&1), Some(long));
        w.advance_by(10);
        assert_eq!(w.remaining(&1), Some(long - w.tick() * 10));
    }

    #[test]
    fn test_advance_duration() {
        let mut w = wheel();
        w.start(9, Duration::from_secs(1));
        assert_eq!(w.advance_duration(Duration::from_secs(1)), vec![9]);
    }

    proptest! {
        #[test]
        fn prop_cancelled_never_fire(
            timers in proptest::collection::vec((0u32..32, 0u64..5000, any::<bool>()), 1..64)
        ) {
            let mut w = TimerWheel::new(16, Duration::from_millis(100));
            let mut live = std::collections::HashMap::new();
            for (token, ms, cancel) in timers {
                let handle = w.start(token, Duration::from_millis(ms));
                if cancel {
                    w.cancel(&token);
                    live.remove(&token);
                } else {
                    live.insert(token, handle.deadline);
                }
            }
            let mut fired = std::collections::HashMap::new();
            for _ in 0..100 {
                for token in w.advance() {
                    prop_assert!(fired.insert(token, w.now()).is_none());
                }
            }
            prop_assert_eq!(fired, live);
        }
    }
}
