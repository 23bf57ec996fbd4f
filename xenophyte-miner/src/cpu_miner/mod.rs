//! CPU mining backend.
//!
//! A fixed pool of OS threads, one [`Worker`] each, searching the template
//! published on a `watch` channel. Winning shares go to a [`ShareSink`];
//! hash counts go to shared [`HashCounters`] read by the hashrate timer.
//!
//! # Configuration
//!
//! See [`CpuMinerConfig`]. `XENOPHYTE_THREADS=N` overrides the thread count.

mod config;
mod hashrate;
mod math;
mod search;
mod share;
mod thread;

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

pub use config::{CpuMinerConfig, ThreadConfig, ThreadPriority, WorkerSettings};
pub use hashrate::{HashCounters, HashrateReport, HashrateTracker, TICK as HASHRATE_TICK};
pub use math::{evaluate, for_each_candidate, rules_for, Candidate, Operator};
pub use search::{FoundShare, JobReceiver, ShareSink, Worker};
pub use share::{format_share, EncryptedShare, ShareEncoder};

use crate::crypto::ShareDigest;
use crate::tracing::prelude::*;

/// Running pool of mining threads. Dropping it stops and joins them.
pub struct CpuMiner {
    stop: Arc<AtomicBool>,
    counters: Arc<HashCounters>,
    threads: Vec<JoinHandle<()>>,
}

impl CpuMiner {
    /// Spawn one worker per configured thread.
    pub fn start<S>(
        config: &CpuMinerConfig,
        digest: ShareDigest,
        jobs: JobReceiver,
        sink: Arc<S>,
    ) -> io::Result<Self>
    where
        S: ShareSink + ?Sized + 'static,
    {
        let workers = config.worker_settings(digest);
        let mut miner = Self {
            stop: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(HashCounters::new(workers.len())),
            threads: Vec::with_capacity(workers.len()),
        };

        for settings in workers {
            let worker = Worker::new(
                settings,
                jobs.clone(),
                Arc::clone(&sink),
                Arc::clone(&miner.counters),
                Arc::clone(&miner.stop),
            );
            miner.threads.push(thread::spawn(worker)?);
        }

        info!(
            threads = miner.threads.len(),
            priority = %config.thread_priority,
            easy_block_only = config.easy_block_only,
            %digest,
            "CPU miner started"
        );
        Ok(miner)
    }

    pub fn counters(&self) -> Arc<HashCounters> {
        Arc::clone(&self.counters)
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Ask every worker to stop at its next check.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Stop and wait for every worker to exit.
    pub fn shutdown(mut self) {
        self.join_all();
    }

    fn join_all(&mut self) {
        self.stop();
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                error!("Mining thread panicked");
            }
        }
    }
}

impl Drop for CpuMiner {
    fn drop(&mut self) {
        self.join_all();
    }
}
