//! Keyed one-shot timers for Partyhall room actors.
//!
//! A [`TimerWheel`] holds at most one deadline per key. Rooms key their
//! timers by what the timer is *for* (the turn, the current phase step, a
//! particular player's reconnect grace), so scheduling a key that is
//! already pending replaces it and a phase can never have two timers
//! racing each other.
//!
//! # Integration
//!
//! The wheel sits inside a room actor's `tokio::select!` loop next to the
//! command channel:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         cmd = commands.recv() => { /* handle command, may schedule/cancel */ }
//!         key = timers.wait_next() => { /* handle expiry of `key` */ }
//!     }
//! }
//! ```
//!
//! Because the actor owns the wheel and only one branch runs at a time,
//! [`TimerWheel::cancel`] is a plain map removal: once it returns, the
//! cancelled key cannot be yielded by a later `wait_next`.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::trace;

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Entry {
    deadline: Instant,
    /// Insertion order, breaks ties between equal deadlines.
    seq: u64,
}

// ---------------------------------------------------------------------------
// Wheel
// ---------------------------------------------------------------------------

/// A set of pending one-shot deadlines, at most one per key.
#[derive(Debug)]
pub struct TimerWheel<K> {
    entries: HashMap<K, Entry>,
    next_seq: u64,
}

impl<K> Default for TimerWheel<K> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            next_seq: 0,
        }
    }
}

impl<K> TimerWheel<K>
where
    K: Copy + Eq + Hash + Debug,
{
    /// Creates an empty wheel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `key` to fire after `delay`, replacing any pending
    /// deadline for the same key.
    pub fn schedule(&mut self, key: K, delay: Duration) {
        self.schedule_at(key, Instant::now() + delay);
    }

    /// Schedules `key` to fire at `deadline`, replacing any pending one.
    pub fn schedule_at(&mut self, key: K, deadline: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        if self.entries.insert(key, Entry { deadline, seq }).is_some() {
            trace!(?key, "timer rescheduled");
        } else {
            trace!(?key, "timer scheduled");
        }
    }

    /// Schedules `key` only if nothing is pending for it.
    ///
    /// Returns `false` (and leaves the existing deadline alone) when the
    /// key was already pending.
    pub fn schedule_if_absent(&mut self, key: K, delay: Duration) -> bool {
        if self.entries.contains_key(&key) {
            return false;
        }
        self.schedule(key, delay);
        true
    }

    /// Cancels the pending deadline for `key`. Returns whether one existed.
    pub fn cancel(&mut self, key: K) -> bool {
        let removed = self.entries.remove(&key).is_some();
        if removed {
            trace!(?key, "timer cancelled");
        }
        removed
    }

    /// Cancels every pending key matching `predicate`. Returns how many
    /// were removed.
    pub fn cancel_where(&mut self, mut predicate: impl FnMut(&K) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !predicate(key));
        before - self.entries.len()
    }

    /// Cancels everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Returns `true` if `key` has a pending deadline.
    pub fn is_pending(&self, key: K) -> bool {
        self.entries.contains_key(&key)
    }

    /// The deadline pending for `key`, if any.
    pub fn deadline(&self, key: K) -> Option<Instant> {
        self.entries.get(&key).map(|entry| entry.deadline)
    }

    /// Time left until `key` fires (zero if already due).
    pub fn remaining(&self, key: K) -> Option<Duration> {
        self.deadline(key)
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Number of pending timers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no timer is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every pending key, earliest deadline first.
    pub fn pending_keys(&self) -> Vec<K> {
        let mut keys: Vec<(K, Entry)> =
            self.entries.iter().map(|(key, entry)| (*key, *entry)).collect();
        keys.sort_by_key(|(_, entry)| (entry.deadline, entry.seq));
        keys.into_iter().map(|(key, _)| key).collect()
    }

    fn peek(&self) -> Option<(K, Entry)> {
        self.entries
            .iter()
            .min_by_key(|(_, entry)| (entry.deadline, entry.seq))
            .map(|(key, entry)| (*key, *entry))
    }

    /// Removes and returns the earliest key whose deadline is at or before
    /// `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<K> {
        let (key, entry) = self.peek()?;
        if entry.deadline > now {
            return None;
        }
        self.entries.remove(&key);
        Some(key)
    }

    /// Waits for the earliest pending deadline and returns its key.
    ///
    /// With nothing pending this future never resolves, which lets a
    /// `select!` loop keep serving its other branches. It is cancel-safe:
    /// the key is only removed after the sleep completes, with no await
    /// point in between.
    pub async fn wait_next(&mut self) -> K {
        let Some((key, entry)) = self.peek() else {
            return std::future::pending::<K>().await;
        };
        time::sleep_until(entry.deadline).await;
        self.entries.remove(&key);
        trace!(?key, "timer fired");
        key
    }
}
