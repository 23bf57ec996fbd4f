//! Configuration for the CPU miner.
//!
//! Loaded as the `cpu_miner` section of the miner configuration file, with
//! the thread count overridable from the environment.

use serde::Deserialize;

use crate::crypto::ShareDigest;

/// OS scheduling priority for a mining thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ThreadPriority {
    Lowest,
    BelowNormal,
    #[default]
    Normal,
    AboveNormal,
    Highest,
}

impl ThreadPriority {
    /// Equivalent nice value.
    pub fn nice(self) -> i32 {
        match self {
            Self::Lowest => 10,
            Self::BelowNormal => 5,
            Self::Normal => 0,
            Self::AboveNormal => -5,
            Self::Highest => -10,
        }
    }
}

/// Per-thread overrides. Unset fields fall back to the pool-wide values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ThreadConfig {
    /// Bit mask of CPUs the thread may run on; 0 leaves it unpinned.
    pub affinity: u64,
    pub priority: Option<ThreadPriority>,
    pub use_xenophyte_randomizer: Option<bool>,
    /// Whether this thread takes part in the easy-block search.
    pub easy_block: Option<bool>,
}

/// CPU miner configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CpuMinerConfig {
    /// Number of mining threads. At least `thread_configs.len()` run.
    pub threads: usize,

    pub thread_priority: ThreadPriority,

    /// Stop after the easy-block search instead of falling back to random
    /// search.
    pub easy_block_only: bool,

    /// Draw random operands with the digit-based sampler.
    pub use_xenophyte_randomizer: bool,

    pub thread_configs: Vec<ThreadConfig>,
}

impl Default for CpuMinerConfig {
    fn default() -> Self {
        Self {
            threads: num_cpus::get(),
            thread_priority: ThreadPriority::Normal,
            easy_block_only: false,
            use_xenophyte_randomizer: false,
            thread_configs: Vec::new(),
        }
    }
}

/// Fully resolved settings for one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    pub id: usize,
    pub affinity: u64,
    pub priority: ThreadPriority,
    pub use_xenophyte_randomizer: bool,
    pub easy_block_only: bool,
    /// `(index, count)` among the easy-block threads, if this one is one.
    pub easy_slot: Option<(usize, usize)>,
    pub digest: ShareDigest,
}

impl CpuMinerConfig {
    /// Apply environment overrides.
    ///
    /// - `XENOPHYTE_THREADS`: number of mining threads
    pub fn apply_env(&mut self) {
        if let Some(threads) = std::env::var("XENOPHYTE_THREADS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.threads = threads;
        }
    }

    pub fn thread_count(&self) -> usize {
        self.threads.max(self.thread_configs.len())
    }

    fn thread_config(&self, id: usize) -> Option<&ThreadConfig> {
        self.thread_configs.get(id)
    }

    /// Resolve per-thread settings, numbering the easy-block threads.
    pub fn worker_settings(&self, digest: ShareDigest) -> Vec<WorkerSettings> {
        let count = self.thread_count();
        let easy_threads: Vec<bool> = (0..count)
            .map(|id| {
                self.thread_config(id)
                    .and_then(|c| c.easy_block)
                    .unwrap_or(true)
            })
            .collect();
        let easy_count = easy_threads.iter().filter(|&&easy| easy).count();

        let mut next_easy = 0;
        (0..count)
            .map(|id| {
                let config = self.thread_config(id);
                let easy_slot = easy_threads[id].then(|| {
                    let slot = (next_easy, easy_count);
                    next_easy += 1;
                    slot
                });

                WorkerSettings {
                    id,
                    affinity: config.map_or(0, |c| c.affinity),
                    priority: config
                        .and_then(|c| c.priority)
                        .unwrap_or(self.thread_priority),
                    use_xenophyte_randomizer: config
                        .and_then(|c| c.use_xenophyte_randomizer)
                        .unwrap_or(self.use_xenophyte_randomizer),
                    easy_block_only: self.easy_block_only,
                    easy_slot,
                    digest,
                }
            })
            .collect()
    }
}
