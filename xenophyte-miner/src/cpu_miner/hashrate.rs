//! Hashrate accounting for the worker pool.
//!
//! Workers bump a per-thread atomic counter for every candidate they hash.
//! A timer swaps the counters out every ten seconds and folds them into
//! 10 s, 60 s and 15 min rates.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::types::HashRate;

/// Interval between counter captures.
pub const TICK: Duration = Duration::from_secs(10);

const TICKS_PER_MINUTE: u64 = 6;
const TICKS_PER_FIFTEEN_MINUTES: u64 = 90;

/// One interval counter per worker.
pub struct HashCounters(Box<[AtomicU64]>);

impl HashCounters {
    pub fn new(workers: usize) -> Self {
        Self((0..workers).map(|_| AtomicU64::new(0)).collect())
    }

    pub fn record(&self, worker: usize, hashes: u64) {
        if let Some(counter) = self.0.get(worker) {
            counter.fetch_add(hashes, Ordering::Relaxed);
        }
    }

    /// Read and reset the counter of `worker`.
    pub fn take(&self, worker: usize) -> u64 {
        self.0
            .get(worker)
            .map_or(0, |counter| counter.swap(0, Ordering::Relaxed))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Hashrates as of the last tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashrateReport {
    pub ten_seconds: Vec<HashRate>,
    pub sixty_seconds: Vec<HashRate>,
    pub fifteen_minutes: Vec<HashRate>,
    /// Highest total 10 s rate seen so far.
    pub max: HashRate,
}

impl HashrateReport {
    fn new(workers: usize) -> Self {
        Self {
            ten_seconds: vec![HashRate::default(); workers],
            sixty_seconds: vec![HashRate::default(); workers],
            fifteen_minutes: vec![HashRate::default(); workers],
            max: HashRate::default(),
        }
    }

    pub fn total_ten_seconds(&self) -> HashRate {
        self.ten_seconds.iter().copied().sum()
    }

    pub fn total_sixty_seconds(&self) -> HashRate {
        self.sixty_seconds.iter().copied().sum()
    }

    pub fn total_fifteen_minutes(&self) -> HashRate {
        self.fifteen_minutes.iter().copied().sum()
    }
}

/// Rolling window state. Driven by the daemon's hashrate timer.
pub struct HashrateTracker {
    sum60: Vec<u64>,
    sum15: Vec<u64>,
    ticks: u64,
    report: HashrateReport,
}

impl HashrateTracker {
    pub fn new(workers: usize) -> Self {
        Self {
            sum60: vec![0; workers],
            sum15: vec![0; workers],
            ticks: 0,
            report: HashrateReport::new(workers),
        }
    }

    pub fn report(&self) -> &HashrateReport {
        &self.report
    }

    /// Capture `counters` and update the report.
    pub fn tick(&mut self, counters: &HashCounters) -> &HashrateReport {
        let started = Instant::now();
        let counts: Vec<u64> = (0..counters.len()).map(|i| counters.take(i)).collect();
        self.apply(&counts, started.elapsed())
    }

    /// Fold one interval of per-worker `counts` into the windows. `overhead`
    /// is added to each window length.
    pub fn apply(&mut self, counts: &[u64], overhead: Duration) -> &HashrateReport {
        self.ticks += 1;
        let minute = self.ticks % TICKS_PER_MINUTE == 0;
        let quarter = self.ticks % TICKS_PER_FIFTEEN_MINUTES == 0;

        for (i, &count) in counts.iter().enumerate().take(self.sum60.len()) {
            self.sum60[i] += count;
            self.sum15[i] += count;
            self.report.ten_seconds[i] = HashRate::from_count(count, TICK + overhead);

            if minute {
                self.report.sixty_seconds[i] =
                    HashRate::from_count(self.sum60[i], TICK * TICKS_PER_MINUTE as u32 + overhead);
                self.sum60[i] = 0;
            }
            if quarter {
                self.report.fifteen_minutes[i] = HashRate::from_count(
                    self.sum15[i],
                    TICK * TICKS_PER_FIFTEEN_MINUTES as u32 + overhead,
                );
                self.sum15[i] = 0;
            }
        }

        let total = self.report.total_ten_seconds();
        if total > self.report.max {
            self.report.max = total;
        }
        &self.report
    }
}
