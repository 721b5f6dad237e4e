//! Wall-time pacing for the few places that talk to the real world: the
//! sensor command sequence and log replay. The fusion hot path never reads
//! a clock; it runs entirely on the millisecond timestamps carried by the
//! samples.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub trait Clock {
    /// Hold the caller for `d` (or pretend to).
    fn pause(&self, d: Duration);

    /// Time passed since this clock was created.
    fn elapsed(&self) -> Duration;

    /// `elapsed()` in whole milliseconds.
    fn elapsed_ms(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }
}

/// Real clock: pauses block the thread; elapsed time is measured from a
/// monotonic anchor taken at construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    anchor: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            anchor: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn pause(&self, d: Duration) {
        if !d.is_zero() {
            std::thread::sleep(d);
        }
    }

    fn elapsed(&self) -> Duration {
        self.anchor.elapsed()
    }
}

/// Simulated clock: a shared millisecond counter that moves only when told
/// to. A pause advances the counter instead of blocking, which keeps
/// command-sequence and replay tests instant.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    now_ms: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance_ms(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn pause(&self, d: Duration) {
        self.advance_ms(d.as_millis() as u64);
    }

    fn elapsed(&self) -> Duration {
        Duration::from_millis(self.now_ms.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_pause_advances_without_blocking() {
        let clock = ManualClock::new();
        clock.pause(Duration::from_millis(150));
        clock.advance_ms(50);
        assert_eq!(clock.elapsed_ms(), 200);
    }

    #[test]
    fn manual_clones_share_the_counter() {
        let a = ManualClock::new();
        let b = a.clone();
        a.advance_ms(75);
        assert_eq!(b.elapsed_ms(), 75);
    }

    #[test]
    fn monotonic_elapsed_never_goes_backwards() {
        let clock = MonotonicClock::new();
        let first = clock.elapsed();
        assert!(clock.elapsed() >= first);
    }
}
