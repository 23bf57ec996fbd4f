//! Share result bookkeeping.

use std::collections::HashMap;

use strum::IntoEnumIterator;

use crate::network::ShareStatus;
use crate::types::JobType;

/// Good/bad counts for one job type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShareTally {
    pub good: u64,
    pub bad: u64,
}

/// Share outcomes per job type.
///
/// A height is only counted once; later results for the same height (other
/// threads finding the same block) are ignored.
#[derive(Debug, Default)]
pub struct ShareStats {
    last_height: Option<i64>,
    tallies: HashMap<JobType, ShareTally>,
}

impl ShareStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a result. Returns false if it was a duplicate for the last
    /// height seen.
    pub fn record(&mut self, height: i64, job_type: JobType, status: ShareStatus) -> bool {
        if self.last_height == Some(height) {
            return false;
        }
        self.last_height = Some(height);

        let tally = self.tallies.entry(job_type).or_default();
        if status.is_accepted() {
            tally.good += 1;
        } else {
            tally.bad += 1;
        }
        true
    }

    pub fn tally(&self, job_type: JobType) -> ShareTally {
        self.tallies.get(&job_type).copied().unwrap_or_default()
    }

    pub fn total(&self) -> ShareTally {
        JobType::iter().fold(ShareTally::default(), |acc, job_type| {
            let tally = self.tally(job_type);
            ShareTally {
                good: acc.good + tally.good,
                bad: acc.bad + tally.bad,
            }
        })
    }
}
