//! Real-time scheduling helpers.
//!
//! The guidance thread runs SCHED_FIFO, pinned to one core, with memory
//! locked. All three calls need elevated privileges on Linux; the loop runs
//! with degraded latency guarantees when they fail, so callers warn and
//! continue rather than abort.

use tracing::warn;

/// Elevate the current thread to real-time priority (1..=99 on Linux).
/// Returns false when the platform or privileges do not allow it.
#[cfg(target_os = "linux")]
pub fn set_realtime_priority(priority: i32) -> bool {
    unsafe {
        let mut param: libc::sched_param = std::mem::zeroed();
        param.sched_priority = priority.clamp(1, 99);
        if libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) != 0 {
            warn!(
                "sched_setscheduler failed: {}",
                std::io::Error::last_os_error()
            );
            return false;
        }
    }
    true
}

#[cfg(not(target_os = "linux"))]
pub fn set_realtime_priority(_priority: i32) -> bool {
    warn!("real-time scheduling not supported on this platform");
    false
}

/// Pin the current thread to one CPU core.
#[cfg(target_os = "linux")]
pub fn set_cpu_affinity(core_id: usize) -> bool {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        if core_id < libc::CPU_SETSIZE as usize {
            libc::CPU_SET(core_id, &mut set);
        }
        if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) != 0 {
            warn!(
                "sched_setaffinity failed: {}",
                std::io::Error::last_os_error()
            );
            return false;
        }
    }
    true
}

#[cfg(not(target_os = "linux"))]
pub fn set_cpu_affinity(_core_id: usize) -> bool {
    false
}

/// Lock all current and future pages so the hot loop never page-faults.
#[cfg(target_os = "linux")]
pub fn lock_memory() -> bool {
    unsafe {
        if libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) != 0 {
            warn!("mlockall failed: {}", std::io::Error::last_os_error());
            return false;
        }
    }
    true
}

#[cfg(not(target_os = "linux"))]
pub fn lock_memory() -> bool {
    false
}
