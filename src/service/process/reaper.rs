//! atexit-based reaper for child processes.
//!
//! Children are normally stopped by the lifecycle controller. Anything still
//! registered when the harness exits (panic unwind, early return from main)
//! gets SIGKILL from the atexit hook so no server outlives the run.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use parking_lot::Mutex;

static REAPER_REGISTERED: AtomicBool = AtomicBool::new(false);
static LIVE_PIDS: OnceLock<Mutex<BTreeSet<u32>>> = OnceLock::new();

fn live_pids() -> &'static Mutex<BTreeSet<u32>> {
    LIVE_PIDS.get_or_init(|| Mutex::new(BTreeSet::new()))
}

/// Track a spawned child until [`forget`] is called
pub(crate) fn track(pid: u32) {
    register_reaper();
    live_pids().lock().insert(pid);
}

/// Stop tracking a child that has been reaped
pub(crate) fn forget(pid: u32) {
    live_pids().lock().remove(&pid);
}

/// Register the reaper with atexit (idempotent).
fn register_reaper() {
    if REAPER_REGISTERED.swap(true, Ordering::SeqCst) {
        return;
    }
    unsafe {
        libc::atexit(reap_all);
    }
}

/// Called by atexit on process exit.
extern "C" fn reap_all() {
    let Some(pids) = LIVE_PIDS.get() else {
        return;
    };
    // Never block inside an exit handler
    let Some(pids) = pids.try_lock() else {
        return;
    };
    for pid in pids.iter() {
        signal(*pid, Signal::Kill);
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Signal {
    Terminate,
    Kill,
}

/// Send a signal to a child by pid
pub(crate) fn signal(pid: u32, signal: Signal) -> bool {
    #[cfg(unix)]
    {
        let Ok(pid) = libc::pid_t::try_from(pid) else {
            return false;
        };
        let signo = match signal {
            Signal::Terminate => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
        };
        unsafe { libc::kill(pid, signo) == 0 }
    }

    #[cfg(not(unix))]
    {
        let _ = (pid, signal);
        false
    }
}
