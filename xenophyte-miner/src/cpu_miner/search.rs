//! The per-thread search loop.
//!
//! A worker waits for a template, pairs its share of the easy-block values
//! against the whole easy set, then keeps drawing random operands until the
//! block is found, a new template arrives or the pool stops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::watch;

use super::config::WorkerSettings;
use super::hashrate::HashCounters;
use super::math::{self, Candidate, Operator};
use super::share::{EncryptedShare, ShareEncoder};
use crate::crypto::random::{bias_random_between, random_between, random_index};
use crate::job::{easy_block, JobTemplate};
use crate::tracing::prelude::*;
use crate::types::JobType;

/// Latest template published to the workers.
pub type JobReceiver = watch::Receiver<Option<Arc<JobTemplate>>>;

const JOB_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Redraws between abandon checks while looking for a non-easy operand.
const REDRAW_CHECK_INTERVAL: u32 = 64;

/// A share whose hash matched the block indication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundShare {
    pub height: i64,
    pub job_type: JobType,
    pub first: i64,
    pub operator: Operator,
    pub second: i64,
    pub solution: i64,
    pub encrypted_share: String,
    pub hash: String,
}

/// Destination for winning shares.
pub trait ShareSink: Send + Sync {
    /// Hand off `share` for submission. Returns false if it was dropped.
    fn submit(&self, share: FoundShare) -> bool;
}

/// State owned by one mining thread.
pub struct Worker<S: ShareSink + ?Sized> {
    settings: WorkerSettings,
    jobs: JobReceiver,
    sink: Arc<S>,
    counters: Arc<HashCounters>,
    stop: Arc<AtomicBool>,
    encoder: ShareEncoder,
    rng: StdRng,
    block_found: bool,
    share: EncryptedShare,
}

impl<S: ShareSink + ?Sized> Worker<S> {
    pub fn new(
        settings: WorkerSettings,
        jobs: JobReceiver,
        sink: Arc<S>,
        counters: Arc<HashCounters>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            encoder: ShareEncoder::new(settings.digest),
            settings,
            jobs,
            sink,
            counters,
            stop,
            rng: StdRng::from_entropy(),
            block_found: false,
            share: EncryptedShare::default(),
        }
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    /// Mine until the stop flag is set or the job sender goes away.
    pub fn run(mut self) {
        debug!(thread = self.settings.id, "Worker started");
        while let Some(job) = self.wait_for_job() {
            trace!(thread = self.settings.id, height = job.height, "Worker took job");
            self.mine(&job);
        }
        debug!(thread = self.settings.id, "Worker stopped");
    }

    fn wait_for_job(&mut self) -> Option<Arc<JobTemplate>> {
        loop {
            if self.stop.load(Ordering::Relaxed) {
                return None;
            }
            match self.jobs.has_changed() {
                Ok(true) => {
                    let job = self.jobs.borrow_and_update().clone();
                    self.block_found = false;
                    if job.is_some() {
                        return job;
                    }
                }
                Ok(false) => std::thread::sleep(JOB_POLL_INTERVAL),
                Err(_) => return None,
            }
        }
    }

    fn should_abandon(&self) -> bool {
        self.block_found
            || self.stop.load(Ordering::Relaxed)
            || self.jobs.has_changed().unwrap_or(true)
    }

    fn mine(&mut self, job: &JobTemplate) {
        if let Some(slot) = self.settings.easy_slot {
            self.easy_search(job, slot);
            if self.should_abandon() {
                return;
            }
        }

        if self.settings.easy_block_only || job.easy_values_cover_range() {
            return;
        }
        self.random_search(job);
    }

    /// Pair every value of this thread's easy chunk with every easy value,
    /// both in random order.
    fn easy_search(&mut self, job: &JobTemplate, (index, count): (usize, usize)) {
        let (start, len) = easy_block::job_chunk(job.easy_values.len(), count, index);
        let mut chunk = job.easy_values[start..start + len].to_vec();
        let mut easy = job.easy_values.clone();

        for i in (0..chunk.len()).rev() {
            let r = random_index(&mut self.rng, i);
            let first = chunk[r];

            for j in (0..easy.len()).rev() {
                let r2 = random_index(&mut self.rng, j);
                self.try_pair(job, first, easy[r2], JobType::Easy);
                easy.swap(j, r2);
            }

            if self.should_abandon() {
                return;
            }
            chunk[r] = chunk[i];
        }
    }

    fn random_search(&mut self, job: &JobTemplate) {
        let mut easy = job.easy_values.clone();

        while !self.should_abandon() {
            let Some(a) = self.draw(job) else { return };
            let Some(b) = self.draw(job) else { return };
            self.try_pair(job, a, b, JobType::Random);
            self.try_pair(job, b, a, JobType::Random);

            for i in (0..easy.len()).rev() {
                if self.should_abandon() {
                    return;
                }
                let r = random_index(&mut self.rng, i);
                let e = easy[r];
                self.try_pair(job, a, e, JobType::SemiRandom);
                self.try_pair(job, e, a, JobType::SemiRandom);
                self.try_pair(job, b, e, JobType::SemiRandom);
                self.try_pair(job, e, b, JobType::SemiRandom);
                easy.swap(i, r);
            }
        }
    }

    /// Random operand outside the easy set, or `None` if the search was
    /// abandoned while redrawing.
    fn draw(&mut self, job: &JobTemplate) -> Option<i64> {
        let mut attempts = 0u32;
        loop {
            let value = if self.settings.use_xenophyte_randomizer {
                bias_random_between(&mut self.rng, job.min_range, job.max_range)
            } else {
                random_between(&mut self.rng, job.min_range, job.max_range)
            };
            if !job.is_easy_value(value) {
                return Some(value);
            }
            attempts = attempts.wrapping_add(1);
            if attempts % REDRAW_CHECK_INTERVAL == 0 && self.should_abandon() {
                return None;
            }
        }
    }

    fn try_pair(&mut self, job: &JobTemplate, a: i64, b: i64, job_type: JobType) {
        math::for_each_candidate(a, b, job.min_range, job.max_range, |candidate| {
            self.try_candidate(job, candidate, job_type)
        });
    }

    fn try_candidate(&mut self, job: &JobTemplate, candidate: Candidate, job_type: JobType) {
        if self.block_found {
            return;
        }
        self.counters.record(self.settings.id, 1);

        if let Err(e) = self.encoder.encrypt(job, &candidate, &mut self.share) {
            trace!(thread = self.settings.id, error = %e, "Candidate skipped");
            return;
        }
        if !self.share.matches(&job.indication) {
            return;
        }

        self.block_found = true;
        info!(
            thread = self.settings.id,
            height = job.height,
            %job_type,
            calculation = %format!(
                "{} {} {} = {}",
                candidate.first, candidate.operator, candidate.second, candidate.solution
            ),
            "Block found"
        );

        let found = FoundShare {
            height: job.height,
            job_type,
            first: candidate.first,
            operator: candidate.operator,
            second: candidate.second,
            solution: candidate.solution,
            encrypted_share: self.share.share_str().to_owned(),
            hash: self.share.hash_str().to_owned(),
        };
        if !self.sink.submit(found) {
            warn!(height = job.height, "Share not submitted, no connection");
        }
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::cpu_miner::config::ThreadPriority;
    use crate::crypto::ShareDigest;
    use crate::job::test_packets::{HEADER, METHOD};
    use crate::job::{BlockHeader, BlockMethod};

    #[derive(Default)]
    struct Collect(Mutex<Vec<FoundShare>>);

    impl ShareSink for Collect {
        fn submit(&self, share: FoundShare) -> bool {
            self.0.lock().push(share);
            true
        }
    }

    fn job_with_range(min: i64, max: i64) -> JobTemplate {
        let header = BlockHeader::parse(HEADER.as_bytes()).unwrap();
        let method = BlockMethod::parse(METHOD.as_bytes()).unwrap();
        let mut job = JobTemplate::build(header, method).unwrap();
        job.min_range = min;
        job.max_range = max;
        job.easy_values = easy_block::generate(min, max);
        job
    }

    fn settings(id: usize, easy_slot: Option<(usize, usize)>) -> WorkerSettings {
        WorkerSettings {
            id,
            affinity: 0,
            priority: ThreadPriority::Normal,
            use_xenophyte_randomizer: false,
            easy_block_only: false,
            easy_slot,
            digest: ShareDigest::default(),
        }
    }

    struct Fixture {
        tx: watch::Sender<Option<Arc<JobTemplate>>>,
        sink: Arc<Collect>,
        counters: Arc<HashCounters>,
        stop: Arc<AtomicBool>,
    }

    impl Fixture {
        fn new(workers: usize) -> Self {
            let (tx, _) = watch::channel(None);
            Self {
                tx,
                sink: Arc::default(),
                counters: Arc::new(HashCounters::new(workers)),
                stop: Arc::default(),
            }
        }

        fn worker(&self, settings: WorkerSettings) -> Worker<Collect> {
            Worker::new(
                settings,
                self.tx.subscribe(),
                self.sink.clone(),
                self.counters.clone(),
                self.stop.clone(),
            )
        }
    }

    fn candidate_count(min: i64, max: i64) -> u64 {
        let mut count = 0;
        for a in min..=max {
            for b in min..=max {
                math::for_each_candidate(a, b, min, max, |_| count += 1);
            }
        }
        count
    }

    #[test]
    fn test_easy_search_finds_planted_share() {
        let mut job = job_with_range(1, 6);
        let target = Candidate {
            first: 3,
            operator: Operator::Add,
            second: 2,
            solution: 5,
        };
        let mut encoded = EncryptedShare::default();
        ShareEncoder::new(ShareDigest::default())
            .encrypt(&job, &target, &mut encoded)
            .unwrap();
        job.indication = encoded.hash_str().to_owned();

        let fixture = Fixture::new(1);
        let mut worker = fixture.worker(settings(0, Some((0, 1))));
        worker.mine(&job);

        let found = fixture.sink.0.lock();
        assert_eq!(found.len(), 1);
        let share = &found[0];
        assert_eq!(share.height, 1050878);
        assert_eq!(share.job_type, JobType::Easy);
        assert_eq!(
            (share.first, share.operator, share.second, share.solution),
            (3, Operator::Add, 2, 5)
        );
        assert_eq!(share.encrypted_share, encoded.share_str());
        assert_eq!(share.hash, job.indication);
    }

    #[test]
    fn test_easy_threads_split_every_pair_once() {
        let job = job_with_range(1, 20);
        let fixture = Fixture::new(2);

        for id in 0..2 {
            let mut worker = fixture.worker(settings(id, Some((id, 2))));
            worker.mine(&job);
        }

        // Easy values cover [1, 20], so random search never starts.
        let total = fixture.counters.take(0) + fixture.counters.take(1);
        assert_eq!(total, candidate_count(1, 20));
        assert!(fixture.sink.0.lock().is_empty());
    }

    #[test]
    fn test_easy_block_only_without_slot_does_nothing() {
        let job = job_with_range(2, 10107);
        let fixture = Fixture::new(1);
        let mut worker = fixture.worker(WorkerSettings {
            easy_block_only: true,
            ..settings(0, None)
        });
        worker.mine(&job);
        assert_eq!(fixture.counters.take(0), 0);
    }

    #[test]
    fn test_draw_avoids_easy_values() {
        let job = job_with_range(1, 300);
        let fixture = Fixture::new(1);
        for randomizer in [false, true] {
            let mut worker = fixture.worker(WorkerSettings {
                use_xenophyte_randomizer: randomizer,
                ..settings(0, None)
            });
            for _ in 0..500 {
                let v = worker.draw(&job).unwrap();
                assert!((1..=300).contains(&v));
                assert!(!job.is_easy_value(v));
            }
        }
    }

    #[test]
    fn test_draw_gives_up_when_stopped() {
        let mut job = job_with_range(1, 300);
        // Every value is easy, so no draw can succeed.
        job.easy_values = (1..=300).collect();
        let fixture = Fixture::new(1);
        fixture.stop.store(true, Ordering::Relaxed);
        for randomizer in [false, true] {
            let mut worker = fixture.worker(WorkerSettings {
                use_xenophyte_randomizer: randomizer,
                ..settings(0, None)
            });
            assert_eq!(worker.draw(&job), None);
        }
    }

    #[test]
    fn test_random_search_reports_no_false_positives() {
        let fixture = Fixture::new(1);
        let worker = fixture.worker(settings(0, None));
        let handle = std::thread::spawn(move || worker.run());

        fixture
            .tx
            .send_replace(Some(Arc::new(job_with_range(2, 10107))));
        std::thread::sleep(Duration::from_millis(200));
        fixture.stop.store(true, Ordering::Relaxed);
        handle.join().unwrap();

        assert!(fixture.counters.take(0) > 0);
        assert!(fixture.sink.0.lock().is_empty());
    }

    #[test]
    fn test_new_job_interrupts_search() {
        let fixture = Fixture::new(1);
        let mut worker = fixture.worker(settings(0, None));

        fixture.tx.send_replace(Some(Arc::new(job_with_range(2, 10107))));
        let job = worker.wait_for_job().unwrap();
        assert!(!worker.should_abandon());

        fixture.tx.send_replace(Some(Arc::new(job_with_range(2, 500))));
        assert!(worker.should_abandon());
        // Returns promptly instead of searching forever.
        worker.mine(&job);

        let next = worker.wait_for_job().unwrap();
        assert_eq!(next.max_range, 500);
    }

    #[test]
    fn test_wait_for_job_exits_on_stop_or_closed_channel() {
        let fixture = Fixture::new(1);
        let mut worker = fixture.worker(settings(0, None));
        fixture.stop.store(true, Ordering::Relaxed);
        assert!(worker.wait_for_job().is_none());

        let (tx, rx) = watch::channel(None);
        let mut worker = Worker::new(
            settings(0, None),
            rx,
            Arc::new(Collect::default()),
            Arc::new(HashCounters::new(1)),
            Arc::default(),
        );
        drop(tx);
        assert!(worker.wait_for_job().is_none());
    }
}
