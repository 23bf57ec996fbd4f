//! Daemon lifecycle management for xenophyte-miner.
//!
//! Wires the network session to the worker pool, runs the hashrate timer and
//! speed printer, applies the reconnect policy and handles signals and
//! graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio::signal::unix::{self, SignalKind};
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::config::MinerConfig;
use crate::cpu_miner::{CpuMiner, HashCounters, HashrateReport, HashrateTracker, HASHRATE_TICK};
use crate::network::{DisconnectReason, Network, NetworkEvent, ShareStatus};
use crate::stats::ShareStats;
use crate::tracing::prelude::*;
use crate::types::JobType;

/// Consecutive-failure reconnect policy.
#[derive(Debug)]
struct RetryPolicy {
    max_failures: u32,
    failures: u32,
}

impl RetryPolicy {
    /// `max_failures == 0` retries forever.
    fn new(max_failures: u32) -> Self {
        Self {
            max_failures,
            failures: 0,
        }
    }

    fn reset(&mut self) {
        self.failures = 0;
    }

    /// Register a failure. Returns the delay before the next attempt, or
    /// `None` once the limit is reached.
    fn on_failure(&mut self) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);
        if self.max_failures != 0 && self.failures >= self.max_failures {
            return None;
        }
        Some(Duration::from_secs(self.failures.into()))
    }
}

/// The main daemon.
pub struct Daemon {
    config: MinerConfig,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Daemon {
    pub fn new(config: MinerConfig) -> Self {
        Self {
            config,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Token that stops the daemon when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run the daemon until shutdown is requested or the node stays
    /// unreachable.
    pub async fn run(self) -> anyhow::Result<()> {
        let settings = self.config.network_settings()?;
        let endpoint = settings.endpoint.clone();

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let network = Arc::new(Network::new(settings, event_tx));

        let (job_tx, job_rx) = watch::channel(None);
        let miner = CpuMiner::start(
            &self.config.cpu_miner,
            self.config.share_digest,
            job_rx,
            Arc::clone(&network),
        )?;

        let (report_tx, report_rx) = watch::channel(HashrateReport::default());
        self.tracker.spawn(hashrate_timer(
            miner.counters(),
            report_tx,
            self.shutdown.clone(),
        ));
        self.tracker.spawn(speed_printer(
            report_rx,
            self.config.print_speed_interval(),
            self.shutdown.clone(),
        ));
        self.tracker.close();

        info!("Started.");
        info!("For debugging, set RUST_LOG=xenophyte_miner=debug or trace.");

        let mut sigint = unix::signal(SignalKind::interrupt())?;
        let mut sigterm = unix::signal(SignalKind::terminate())?;

        let mut retry = RetryPolicy::new(self.config.max_retry_count);
        let mut reconnect_at = Some(Instant::now());
        let mut stats = ShareStats::new();
        let mut result = Ok(());

        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    info!("Received SIGINT.");
                    break;
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM.");
                    break;
                }
                _ = self.shutdown.cancelled() => break,
                _ = wait_until(reconnect_at) => {
                    reconnect_at = None;
                    info!(%endpoint, "Connecting");
                    // Failures arrive as Disconnected events.
                    let _ = network.connect().await;
                }
                Some(event) = event_rx.recv() => match event {
                    NetworkEvent::Ready => {
                        retry.reset();
                        info!(%endpoint, "Logged in, mining");
                    }
                    NetworkEvent::Disconnected(DisconnectReason::Requested) => {}
                    NetworkEvent::Disconnected(reason) => {
                        warn!(%endpoint, %reason, "Disconnected");
                        match retry.on_failure() {
                            Some(delay) => {
                                debug!(?delay, failures = retry.failures, "Reconnecting");
                                reconnect_at = Some(Instant::now() + delay);
                            }
                            None => {
                                error!(
                                    %endpoint,
                                    failures = retry.failures,
                                    "Node unreachable, giving up"
                                );
                                result = Err(anyhow!(
                                    "{endpoint} unreachable after {} attempts",
                                    retry.failures
                                ));
                                break;
                            }
                        }
                    }
                    NetworkEvent::NewJob(job) => {
                        info!(
                            height = job.height,
                            difficulty = job.difficulty,
                            method = %job.method,
                            range = %format!("{}..={}", job.min_range, job.max_range),
                            "New job"
                        );
                        job_tx.send_replace(Some(job));
                    }
                    NetworkEvent::ShareResult { height, job_type, status, round_trip } => {
                        report_share(&mut stats, height, job_type, status, round_trip);
                    }
                },
            }
        }

        self.shutdown.cancel();
        miner.stop();
        network.disconnect().await;
        self.tracker.wait().await;
        if tokio::task::spawn_blocking(move || miner.shutdown())
            .await
            .is_err()
        {
            error!("Failed to join mining threads");
        }
        info!("Exiting.");

        result
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn report_share(
    stats: &mut ShareStats,
    height: i64,
    job_type: JobType,
    status: ShareStatus,
    round_trip: Duration,
) {
    if !stats.record(height, job_type, status) {
        debug!(height, "Duplicate share result ignored");
        return;
    }

    let total = stats.total();
    match status.reason() {
        None => info!(
            height,
            %job_type,
            ?round_trip,
            good = total.good,
            bad = total.bad,
            "Share accepted"
        ),
        Some(reason) => warn!(
            height,
            %job_type,
            ?round_trip,
            good = total.good,
            bad = total.bad,
            reason,
            "Share rejected"
        ),
    }
}

/// Capture the worker counters every tick and publish the report.
async fn hashrate_timer(
    counters: Arc<HashCounters>,
    reports: watch::Sender<HashrateReport>,
    shutdown: CancellationToken,
) {
    let mut tracker = HashrateTracker::new(counters.len());
    let mut ticker = time::interval_at(Instant::now() + HASHRATE_TICK, HASHRATE_TICK);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                reports.send_replace(tracker.tick(&counters).clone());
            }
        }
    }
}

/// Log the latest hashrate report every `period`.
async fn speed_printer(
    reports: watch::Receiver<HashrateReport>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => print_speed(&reports.borrow()),
        }
    }
}

fn print_speed(report: &HashrateReport) {
    info!(
        ten_seconds = %report.total_ten_seconds().to_human_readable(),
        sixty_seconds = %report.total_sixty_seconds().to_human_readable(),
        fifteen_minutes = %report.total_fifteen_minutes().to_human_readable(),
        max = %report.max.to_human_readable(),
        "Speed"
    );
    for (thread, rate) in report.ten_seconds.iter().enumerate() {
        debug!(
            thread,
            ten_seconds = %rate.to_human_readable(),
            sixty_seconds = %report.sixty_seconds[thread].to_human_readable(),
            fifteen_minutes = %report.fifteen_minutes[thread].to_human_readable(),
            "Thread speed"
        );
    }
}
