//! Periodic real-time threads.
//!
//! The original runtime treats `RealtimeThread` as a collaborator: a
//! periodic thread whose `waitForNextPeriod()` barrier delivers one tick
//! per configured period. [`Timer`](crate::timer::Timer) and the
//! [`ServoJxce1`](crate::drivers::servo_jxce1::ServoJxce1) cyclic PDO
//! exchange both build on it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::thread::{NamedThread, ThreadHandle};

/// A periodic task driven by [`PeriodicThread`]. `tick` is called once per
/// period until it returns `false` or the thread is stopped.
pub trait PeriodicTask: Send + 'static {
    fn tick(&mut self);
}

impl<F: FnMut() + Send + 'static> PeriodicTask for F {
    fn tick(&mut self) {
        self()
    }
}

/// A background thread that calls a [`PeriodicTask`] once per fixed period,
/// using a monotonic accumulator so scheduling jitter does not compound
/// drift across ticks.
pub struct PeriodicThread {
    stop_flag: Arc<AtomicBool>,
    handle: Option<ThreadHandle>,
}

impl PeriodicThread {
    /// Starts a periodic thread named `name`, running `task.tick()` every
    /// `period` at `priority`.
    pub fn start<T: PeriodicTask>(
        name: impl Into<String>,
        priority: i32,
        period: Duration,
        mut task: T,
    ) -> Self {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_flag_in_thread = stop_flag.clone();

        let handle = NamedThread::new(name).with_priority(priority).start(move || {
            let mut next = Instant::now() + period;
            while !stop_flag_in_thread.load(Ordering::SeqCst) {
                task.tick();
                let now = Instant::now();
                if next > now {
                    std::thread::sleep(next - now);
                }
                next += period;
            }
        });

        PeriodicThread {
            stop_flag,
            handle: Some(handle),
        }
    }

    /// Requests the thread stop and blocks until it does.
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.join();
        }
    }
}

impl Drop for PeriodicThread {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn ticks_accumulate_over_time() {
        let count = Arc::new(AtomicU32::new(0));
        let count_in_task = count.clone();

        let mut thread = PeriodicThread::start(
            "test-tick",
            crate::thread::MIN_PRIORITY,
            Duration::from_millis(5),
            move || {
                count_in_task.fetch_add(1, Ordering::SeqCst);
            },
        );

        std::thread::sleep(Duration::from_millis(55));
        thread.stop();

        let ticks = count.load(Ordering::SeqCst);
        assert!(ticks >= 5 && ticks <= 15, "unexpected tick count: {ticks}");
    }
}
