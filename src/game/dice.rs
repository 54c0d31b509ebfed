//! Random rolls for combat, loot and flee checks
//!
//! Everything random in the engine goes through [`Dice`] so tests can swap the
//! seeded generator for a scripted one.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Source of randomness used by the combat engine
pub trait Dice: Send {
    /// Uniform integer in `lo..=hi`. Returns `lo` when the range is empty.
    fn roll(&mut self, lo: i32, hi: i32) -> i32;

    /// True with probability `p` (clamped to `[0, 1]`)
    fn chance(&mut self, p: f64) -> bool;

    /// Uniform index in `0..len`. Returns 0 for an empty range.
    fn pick(&mut self, len: usize) -> usize;
}

/// Seeded ChaCha dice, reproducible from the seed
#[derive(Debug, Clone)]
pub struct SeededDice {
    rng: ChaCha8Rng,
    seed: u64,
}

impl SeededDice {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    /// Create dice with a random seed
    pub fn from_entropy() -> Self {
        Self::new(rand::random())
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl Dice for SeededDice {
    fn roll(&mut self, lo: i32, hi: i32) -> i32 {
        if hi <= lo {
            return lo;
        }
        self.rng.gen_range(lo..=hi)
    }

    fn chance(&mut self, p: f64) -> bool {
        if p.is_nan() {
            return false;
        }
        self.rng.gen_bool(p.clamp(0.0, 1.0))
    }

    fn pick(&mut self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        self.rng.gen_range(0..len)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;

    use super::Dice;

    /// Dice that replay queued outcomes, then fall back to fixed defaults.
    ///
    /// Rolls are clamped into the requested range.
    #[derive(Debug, Clone, Default)]
    pub struct ScriptedDice {
        pub rolls: VecDeque<i32>,
        pub chances: VecDeque<bool>,
        pub picks: VecDeque<usize>,
        pub default_roll: i32,
        pub default_chance: bool,
    }

    impl ScriptedDice {
        /// Every roll yields `roll` (clamped), every chance yields `chance`,
        /// every pick yields the first element.
        pub fn fixed(roll: i32, chance: bool) -> Self {
            Self {
                default_roll: roll,
                default_chance: chance,
                ..Self::default()
            }
        }

        pub fn with_chances(mut self, chances: &[bool]) -> Self {
            self.chances.extend(chances.iter().copied());
            self
        }
    }

    impl Dice for ScriptedDice {
        fn roll(&mut self, lo: i32, hi: i32) -> i32 {
            let v = self.rolls.pop_front().unwrap_or(self.default_roll);
            v.clamp(lo, hi.max(lo))
        }

        fn chance(&mut self, _p: f64) -> bool {
            self.chances.pop_front().unwrap_or(self.default_chance)
        }

        fn pick(&mut self, len: usize) -> usize {
            let v = self.picks.pop_front().unwrap_or(0);
            if len == 0 {
                0
            } else {
                v.min(len - 1)
            }
        }
    }
}
