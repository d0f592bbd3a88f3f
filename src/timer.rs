//! A millisecond monotonic counter built on [`PeriodicThread`].

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::realtime::PeriodicThread;
use crate::thread::MIN_PRIORITY;

/// A free-running millisecond counter that can be started, stopped and
/// reset. The underlying 1 ms periodic thread runs for the `Timer`'s
/// entire lifetime, at the minimum real-time priority.
pub struct Timer {
    time: Arc<AtomicU32>,
    running: Arc<AtomicBool>,
    thread: PeriodicThread,
}

impl Timer {
    pub fn new() -> Self {
        let time = Arc::new(AtomicU32::new(0));
        let running = Arc::new(AtomicBool::new(false));

        let time_in_tick = time.clone();
        let running_in_tick = running.clone();

        let thread = PeriodicThread::start(
            "Timer",
            MIN_PRIORITY,
            Duration::from_millis(1),
            move || {
                if running_in_tick.load(Ordering::SeqCst) {
                    let _ = time_in_tick.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| {
                        if t < u32::MAX {
                            Some(t + 1)
                        } else {
                            None
                        }
                    });
                }
            },
        );

        Timer { time, running, thread }
    }

    /// Starts the timer; does not reset the accumulated time.
    pub fn start(&mut self) {
        self.running.store(true, Ordering::SeqCst);
    }

    /// Stops the timer; does not reset the accumulated time.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Zeroes the accumulated time without changing the running state.
    pub fn reset(&mut self) {
        self.time.store(0, Ordering::SeqCst);
    }

    /// Reads the accumulated time in milliseconds. Saturates at `u32::MAX`
    /// and stays there silently; a caller timing a span that could run that
    /// long is responsible for its own overflow wrapping.
    pub fn read(&self) -> u32 {
        self.time.load(Ordering::SeqCst)
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.thread.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_is_monotonic_while_running() {
        let mut timer = Timer::new();
        timer.start();

        let mut last = timer.read();
        for _ in 0..20 {
            std::thread::sleep(Duration::from_millis(5));
            let now = timer.read();
            assert!(now >= last);
            last = now;
        }
        timer.stop();
    }

    #[test]
    fn stop_does_not_reset() {
        let mut timer = Timer::new();
        timer.start();
        std::thread::sleep(Duration::from_millis(30));
        timer.stop();
        let stopped_value = timer.read();
        assert!(stopped_value > 0);

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(timer.read(), stopped_value);
    }

    #[test]
    fn reset_zeroes_time() {
        let mut timer = Timer::new();
        timer.start();
        std::thread::sleep(Duration::from_millis(20));
        timer.reset();
        assert_eq!(timer.read(), 0);
    }

    #[test]
    fn start_sleep_t_stop_is_within_jitter_bound() {
        let mut timer = Timer::new();
        timer.start();
        std::thread::sleep(Duration::from_millis(100));
        timer.stop();

        let elapsed = timer.read();
        assert!((90..=130).contains(&elapsed), "elapsed={elapsed}");
    }
}
