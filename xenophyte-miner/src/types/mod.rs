//! Core types for xenophyte-miner.
//!
//! Small value types shared between the miner, the network session and the
//! statistics.

use std::time::Duration;

/// Hashrate measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct HashRate(pub u64); // hashes per second

impl HashRate {
    /// Rate of `hashes` over `elapsed`.
    pub fn from_count(hashes: u64, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return Self(0);
        }
        Self((hashes as f64 / secs) as u64)
    }

    /// Get value as kilohashes per second
    pub fn as_kilohashes(&self) -> f64 {
        self.0 as f64 / 1_000.0
    }

    /// Get value as megahashes per second
    pub fn as_megahashes(&self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Format as human-readable string with appropriate units
    pub fn to_human_readable(&self) -> String {
        if self.0 >= 1_000_000 {
            format!("{:.2} MH/s", self.as_megahashes())
        } else if self.0 >= 1_000 {
            format!("{:.2} KH/s", self.as_kilohashes())
        } else {
            format!("{} H/s", self.0)
        }
    }
}

impl std::ops::Add for HashRate {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl std::iter::Sum for HashRate {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |acc, r| acc + r)
    }
}

/// Search phase that produced a candidate share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
pub enum JobType {
    /// Both operands come from the easy-block set.
    #[strum(serialize = "Easy Block")]
    Easy,
    /// One random operand paired with an easy-block value.
    #[strum(serialize = "Semi Random")]
    SemiRandom,
    /// Both operands drawn at random.
    #[strum(serialize = "Random")]
    Random,
}
