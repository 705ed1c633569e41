//! Room codes: fixed-width numeric identifiers drawn from a bounded space.

use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Smallest room code.
pub const CODE_MIN: u16 = 1000;
/// Largest room code.
pub const CODE_MAX: u16 = 9999;
/// Number of distinct codes (9000).
pub const CODE_SPACE: usize = (CODE_MAX - CODE_MIN) as usize + 1;

/// Random draws before falling back to a sweep of the whole code space.
const MAX_RANDOM_DRAWS: usize = 64;

/// Short public identifier matching two connections into one room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    pub fn new(code: impl Into<String>) -> Self {
        RoomCode(code.into())
    }

    /// Code for a number in the code space; always four digits.
    pub fn from_number(n: u16) -> Self {
        RoomCode(n.clamp(CODE_MIN, CODE_MAX).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of candidate codes. Values outside `CODE_MIN..=CODE_MAX` are clamped.
pub trait CodeSource: Send {
    fn draw(&mut self) -> u16;
}

/// Uniform draws over the code space.
pub struct RandomCodes {
    rng: StdRng,
}

impl RandomCodes {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomCodes {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeSource for RandomCodes {
    fn draw(&mut self) -> u16 {
        self.rng.gen_range(CODE_MIN..=CODE_MAX)
    }
}

/// Draw a code for which `taken` is false.
///
/// Up to `MAX_RANDOM_DRAWS` random draws, then one sweep of the code space
/// starting at the last draw. Returns `None` only when every code is taken.
pub fn unique_code(
    source: &mut dyn CodeSource,
    taken: impl Fn(&RoomCode) -> bool,
) -> Option<RoomCode> {
    let mut last = CODE_MIN;
    for _ in 0..MAX_RANDOM_DRAWS {
        last = source.draw().clamp(CODE_MIN, CODE_MAX);
        let code = RoomCode::from_number(last);
        if !taken(&code) {
            return Some(code);
        }
    }
    let offset = (last - CODE_MIN) as usize;
    (0..CODE_SPACE)
        .map(|i| CODE_MIN + ((offset + i) % CODE_SPACE) as u16)
        .map(RoomCode::from_number)
        .find(|code| !taken(code))
}

/// Replays a fixed list of draws, cycling when exhausted.
#[cfg(test)]
pub(crate) struct ScriptedCodes {
    draws: Vec<u16>,
    next: usize,
}

#[cfg(test)]
impl ScriptedCodes {
    pub(crate) fn new(draws: &[u16]) -> Self {
        Self {
            draws: draws.to_vec(),
            next: 0,
        }
    }
}

#[cfg(test)]
impl CodeSource for ScriptedCodes {
    fn draw(&mut self) -> u16 {
        let n = self.draws[self.next % self.draws.len()];
        self.next += 1;
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn random_codes_stay_in_range() {
        let mut source = RandomCodes::seeded(7);
        for _ in 0..1000 {
            let code = RoomCode::from_number(source.draw());
            assert_eq!(code.as_str().len(), 4);
            let n: u16 = code.as_str().parse().unwrap();
            assert!((CODE_MIN..=CODE_MAX).contains(&n));
        }
    }

    #[test]
    fn from_number_clamps() {
        assert_eq!(RoomCode::from_number(5).as_str(), "1000");
        assert_eq!(RoomCode::from_number(60000).as_str(), "9999");
        assert_eq!(RoomCode::from_number(4821).as_str(), "4821");
    }

    #[test]
    fn unique_code_skips_taken_draws() {
        let mut source = ScriptedCodes::new(&[4821, 4821, 1234]);
        let taken: HashSet<RoomCode> = [RoomCode::new("4821")].into_iter().collect();
        let code = unique_code(&mut source, |c| taken.contains(c)).unwrap();
        assert_eq!(code.as_str(), "1234");
    }

    #[test]
    fn unique_code_sweeps_when_draws_keep_colliding() {
        // Every draw hits 9999; the sweep wraps around to the start of the space.
        let mut source = ScriptedCodes::new(&[9999]);
        let code = unique_code(&mut source, |c| c.as_str() == "9999").unwrap();
        assert_eq!(code.as_str(), "1000");
    }

    #[test]
    fn unique_code_finds_last_free_code() {
        let mut source = RandomCodes::seeded(1);
        let code = unique_code(&mut source, |c| c.as_str() != "5555").unwrap();
        assert_eq!(code.as_str(), "5555");
    }

    #[test]
    fn unique_code_exhausted() {
        let mut source = RandomCodes::seeded(1);
        assert!(unique_code(&mut source, |_| true).is_none());
    }
}
