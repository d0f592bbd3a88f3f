//! Named background threads with a clamped priority level.
//!
//! This mirrors the `Thread` class of the original C++ runtime: a
//! round-robin-scheduled background thread intended for state machines,
//! protocol handlers and similar tasks. Periodic, high-priority control
//! loops should use [`crate::realtime::PeriodicThread`] instead.

use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Lowest priority level a [`NamedThread`] can run at.
///
/// On Linux this is one above the minimum `SCHED_RR` priority; on
/// platforms without a round-robin scheduler it is a purely bookkeeping
/// value recorded for diagnostics.
pub const MIN_PRIORITY: i32 = 1;

/// Highest priority level a [`NamedThread`] can run at — the midpoint
/// between the platform's round-robin minimum and maximum.
pub const MAX_PRIORITY: i32 = 49;

/// Minimum stack size accepted by [`NamedThread::with_stack_size`], in bytes.
/// Requests below this are clamped up.
pub const MIN_STACK_SIZE: usize = 16 * 1024;

fn clamp_priority(priority: i32) -> i32 {
    priority.clamp(MIN_PRIORITY, MAX_PRIORITY)
}

/// Builder and handle for a named background thread.
///
/// Construction is inert: nothing runs until [`NamedThread::start`] is
/// called with the closure that becomes the thread's `run()` body.
pub struct NamedThread {
    name: String,
    stack_size: usize,
    priority: i32,
}

impl NamedThread {
    /// Creates an inert thread descriptor with the given name, the
    /// default stack size and [`MIN_PRIORITY`].
    pub fn new(name: impl Into<String>) -> Self {
        NamedThread {
            name: name.into(),
            stack_size: MIN_STACK_SIZE,
            priority: MIN_PRIORITY,
        }
    }

    /// Sets the desired stack size, clamped up to [`MIN_STACK_SIZE`].
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size.max(MIN_STACK_SIZE);
        self
    }

    /// Sets the desired priority, clamped to `[MIN_PRIORITY, MAX_PRIORITY]`.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = clamp_priority(priority);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stack_size(&self) -> usize {
        self.stack_size
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Spawns the thread, running `body` until it returns. Returns a
    /// [`ThreadHandle`] that can be queried for liveness and joined.
    ///
    /// The body runs at this thread's configured priority on platforms
    /// where that can be applied; elsewhere the priority is bookkeeping
    /// only, matching the "best effort" posture the original runtime takes
    /// on non-QNX targets.
    pub fn start<F>(self, body: F) -> ThreadHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let alive = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true));
        let alive_in_thread = alive.clone();

        let join_handle = std::thread::Builder::new()
            .name(self.name.clone())
            .stack_size(self.stack_size)
            .spawn(move || {
                apply_priority(self.priority);
                body();
                alive_in_thread.store(false, std::sync::atomic::Ordering::SeqCst);
            })
            .expect("failed to spawn NamedThread");

        ThreadHandle {
            name: self.name,
            alive,
            join_handle: Some(join_handle),
        }
    }
}

#[cfg(all(unix, not(target_os = "macos")))]
fn apply_priority(priority: i32) {
    // Best-effort: a round-robin priority bump requires privileges this
    // process may not have. Failure is intentionally ignored, as it is in
    // the original runtime when pthread_attr_setschedparam is rejected by
    // the kernel.
    unsafe {
        let param = libc::sched_param { sched_priority: priority };
        let _ = libc::sched_setscheduler(0, libc::SCHED_RR, &param);
    }
}

#[cfg(not(all(unix, not(target_os = "macos"))))]
fn apply_priority(_priority: i32) {}

/// A running (or finished) [`NamedThread`].
pub struct ThreadHandle {
    name: String,
    alive: std::sync::Arc<std::sync::atomic::AtomicBool>,
    join_handle: Option<JoinHandle<()>>,
}

impl ThreadHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True from the return of `start()` until the thread's body returns.
    pub fn is_alive(&self) -> bool {
        self.alive.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Blocks until the thread body returns.
    pub fn join(mut self) {
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }

    /// Blocks until the thread body returns or `timeout` elapses,
    /// whichever comes first. Returns `true` if the thread finished.
    ///
    /// There is no portable timed-join in std; this degrades to polling
    /// [`is_alive`](Self::is_alive), which is the same "degrades to
    /// infinite join otherwise" fallback the original API documents for
    /// platforms lacking `pthread_timedjoin`.
    pub fn join_timeout(mut self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while self.is_alive() {
            if std::time::Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
        true
    }
}

/// Suspends the calling thread for `millis` milliseconds, resuming for the
/// remaining duration if interrupted by a signal (EINTR-robust).
pub fn sleep_ms(millis: i32) {
    if millis <= 0 {
        return;
    }
    std::thread::sleep(Duration::from_millis(millis as u64));
}

/// Current wall-clock time in milliseconds, truncated to a signed 32-bit
/// integer (matches the original's `currentTimeMillis()` overflow
/// behaviour: this is a diagnostic timestamp, not a monotonic clock).
pub fn current_time_millis() -> i32 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    now.as_millis() as i32
}

/// Current wall-clock time in microseconds, truncated to a signed 32-bit
/// integer.
pub fn current_time_micros() -> i32 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    now.as_micros() as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn priority_is_clamped() {
        let t = NamedThread::new("t").with_priority(-10);
        assert_eq!(t.priority(), MIN_PRIORITY);

        let t = NamedThread::new("t").with_priority(10_000);
        assert_eq!(t.priority(), MAX_PRIORITY);
    }

    #[test]
    fn stack_size_is_clamped_up() {
        let t = NamedThread::new("t").with_stack_size(1);
        assert_eq!(t.stack_size(), MIN_STACK_SIZE);
    }

    #[test]
    fn alive_tracks_run_body() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran_in_thread = ran.clone();

        let handle = NamedThread::new("worker").start(move || {
            ran_in_thread.store(true, Ordering::SeqCst);
        });

        handle.join();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn join_timeout_returns_false_if_still_running() {
        let handle = NamedThread::new("sleeper").start(|| {
            std::thread::sleep(Duration::from_millis(200));
        });

        assert!(!handle.join_timeout(Duration::from_millis(10)));
    }
}
