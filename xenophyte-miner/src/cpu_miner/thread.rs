//! Worker thread spawning and OS scheduling hints.

use std::io;
use std::thread::{self, JoinHandle};

use super::config::ThreadPriority;
use super::search::{ShareSink, Worker};
use crate::tracing::prelude::*;

/// Spawn `worker` on a named OS thread, pinning it and adjusting its
/// priority first.
pub fn spawn<S>(worker: Worker<S>) -> io::Result<JoinHandle<()>>
where
    S: ShareSink + ?Sized + 'static,
{
    let settings = worker.settings().clone();
    thread::Builder::new()
        .name(format!("xenophyte-miner-{}", settings.id))
        .spawn(move || {
            if settings.affinity != 0 {
                set_affinity(settings.id, settings.affinity);
            }
            if settings.priority != ThreadPriority::Normal {
                set_priority(settings.id, settings.priority);
            }
            worker.run();
        })
}

/// CPUs selected by `mask`, lowest first.
fn cpus_in_mask(mask: u64) -> impl Iterator<Item = usize> {
    (0..64).filter(move |cpu| mask & (1u64 << cpu) != 0)
}

#[cfg(target_os = "linux")]
fn set_affinity(id: usize, mask: u64) {
    use std::mem;

    // SAFETY: cpu_set_t is plain data; every CPU index is below 64, well
    // within CPU_SETSIZE.
    let result = unsafe {
        let mut set: libc::cpu_set_t = mem::zeroed();
        libc::CPU_ZERO(&mut set);
        for cpu in cpus_in_mask(mask) {
            libc::CPU_SET(cpu, &mut set);
        }
        libc::sched_setaffinity(0, mem::size_of::<libc::cpu_set_t>(), &set)
    };

    if result == 0 {
        debug!(thread = id, mask = %format!("{mask:#x}"), "Thread pinned");
    } else {
        warn!(
            thread = id,
            mask = %format!("{mask:#x}"),
            error = %io::Error::last_os_error(),
            "Failed to set thread affinity"
        );
    }
}

#[cfg(target_os = "linux")]
fn set_priority(id: usize, priority: ThreadPriority) {
    // SAFETY: plain syscalls on the calling thread.
    let result = unsafe {
        let tid = libc::syscall(libc::SYS_gettid) as libc::id_t;
        libc::setpriority(libc::PRIO_PROCESS, tid, priority.nice())
    };

    if result == 0 {
        debug!(thread = id, %priority, "Thread priority set");
    } else {
        warn!(
            thread = id,
            %priority,
            error = %io::Error::last_os_error(),
            "Failed to set thread priority"
        );
    }
}

#[cfg(not(target_os = "linux"))]
fn set_affinity(id: usize, mask: u64) {
    let cpus: Vec<usize> = cpus_in_mask(mask).collect();
    info!(thread = id, ?cpus, "Thread affinity not supported here, ignored");
}

#[cfg(not(target_os = "linux"))]
fn set_priority(id: usize, priority: ThreadPriority) {
    info!(thread = id, %priority, "Thread priority not supported here, ignored");
}
