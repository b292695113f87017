//! Dice, shuffles, and the small validation helpers the games share.
//!
//! Rooms never call a global RNG. They draw from a [`Randomness`] source
//! handed to them at creation, so a test (or a replay) can script exactly
//! which dice come up.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A source of uniform random choices.
pub trait Randomness: Send {
    /// A uniform integer in `0..upper`. `upper` is never zero.
    fn below(&mut self, upper: usize) -> usize;

    /// A uniform die face in `1..=6`.
    fn roll_die(&mut self) -> u8 {
        // below(6) < 6, so the cast is lossless.
        self.below(6) as u8 + 1
    }
}

/// The production source: a `StdRng` seeded from the OS.
#[derive(Debug)]
pub struct ThreadRandomness(StdRng);

impl ThreadRandomness {
    /// Creates a source seeded from operating-system entropy.
    pub fn new() -> Self {
        Self(StdRng::from_os_rng())
    }

    /// Creates a reproducible source.
    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl Default for ThreadRandomness {
    fn default() -> Self {
        Self::new()
    }
}

impl Randomness for ThreadRandomness {
    fn below(&mut self, upper: usize) -> usize {
        self.0.random_range(0..upper)
    }

    fn roll_die(&mut self) -> u8 {
        self.0.random_range(1..=6)
    }
}

/// A source that replays queued values, for tests and replays.
///
/// Dice come from the dice queue, everything else from the pick queue
/// (reduced modulo the requested bound). An exhausted queue yields the
/// lowest value: die face 1, pick 0.
#[derive(Debug, Default, Clone)]
pub struct ScriptedRandomness {
    dice: VecDeque<u8>,
    picks: VecDeque<usize>,
}

impl ScriptedRandomness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues die faces (each clamped into `1..=6`).
    pub fn with_dice(mut self, faces: impl IntoIterator<Item = u8>) -> Self {
        self.dice.extend(faces.into_iter().map(|f| f.clamp(1, 6)));
        self
    }

    /// Queues picks for [`Randomness::below`].
    pub fn with_picks(mut self, picks: impl IntoIterator<Item = usize>) -> Self {
        self.picks.extend(picks);
        self
    }
}

impl Randomness for ScriptedRandomness {
    fn below(&mut self, upper: usize) -> usize {
        self.picks.pop_front().map_or(0, |pick| pick % upper.max(1))
    }

    fn roll_die(&mut self) -> u8 {
        self.dice.pop_front().unwrap_or(1)
    }
}

/// Fisher–Yates shuffle in place.
///
/// Written out rather than `SliceRandom::shuffle` so every swap draws
/// from [`Randomness`], which lets tests script the resulting order.
pub fn shuffle<T>(rng: &mut dyn Randomness, items: &mut [T]) {
    for i in (1..items.len()).rev() {
        let j = rng.below(i + 1);
        items.swap(i, j);
    }
}

/// Picks a uniformly random element, `None` for an empty slice.
pub fn choose<'a, T>(rng: &mut dyn Randomness, items: &'a [T]) -> Option<&'a T> {
    if items.is_empty() {
        None
    } else {
        items.get(rng.below(items.len()))
    }
}

/// Returns `true` if `value` is a four-digit number (1000–9999).
pub fn validate_four_digit(value: i64) -> bool {
    (1000..=9999).contains(&value)
}

/// Counts positions where `guess` and `target` have the same digit.
///
/// Both must be four-digit numbers; callers validate first.
pub fn compare_digit_positions(guess: u16, target: u16) -> u8 {
    let guess = guess.to_string();
    let target = target.to_string();
    let matches = guess
        .bytes()
        .zip(target.bytes())
        .take(4)
        .filter(|(g, t)| g == t)
        .count();
    // At most 4.
    matches as u8
}
