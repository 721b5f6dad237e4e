//! SHOE-style zero-velocity detector.
//!
//! A sample is "quiet" iff both its gyro magnitude and its gravity-removed
//! accel magnitude are strictly below the configured thresholds. The
//! detector latches active only after the whole window has stayed quiet for
//! the minimum hold time, and releases through a short hysteresis so a
//! single disturbed sample inside an otherwise quiet window cannot chatter
//! the output.

use crate::sample::EnuSample;
use crate::window::SampleWindow;
use bartrack_config::ZuptParams;

/// Release hysteresis: the stationary latch survives this long after the
/// first disturbance.
pub const HYSTERESIS_MS: u64 = 100;

#[derive(Debug)]
pub struct ZuptDetector {
    params: ZuptParams,
    /// Swapped in at the start of the next update; keeps parameter changes
    /// atomic with respect to a sample.
    pending: Option<ZuptParams>,
    stationary_since: Option<u64>,
    release_since: Option<u64>,
    active: bool,
}

impl ZuptDetector {
    pub fn new(params: ZuptParams) -> Self {
        Self {
            params,
            pending: None,
            stationary_since: None,
            release_since: None,
            active: false,
        }
    }

    /// Stage new thresholds; they take effect from the next sample.
    pub fn set_params(&mut self, params: ZuptParams) {
        self.pending = Some(params);
    }

    pub fn params(&self) -> &ZuptParams {
        &self.params
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn reset(&mut self) {
        self.stationary_since = None;
        self.release_since = None;
        self.active = false;
    }

    #[inline]
    fn is_quiet(&self, s: &EnuSample) -> bool {
        s.gyro_norm() < self.params.gyro_thresh && s.accel_norm() < self.params.accel_thresh
    }

    /// Classify the newest sample of `window`. Returns the stationary
    /// decision for this sample.
    pub fn update(&mut self, window: &SampleWindow) -> bool {
        if let Some(p) = self.pending.take() {
            self.params = p;
        }
        let Some(current) = window.latest() else {
            return false;
        };
        let now = current.timestamp_ms;

        if !self.is_quiet(current) {
            // Direct disturbance: report moving right away. The latch only
            // fully releases once the hysteresis window has elapsed.
            self.stationary_since = None;
            let since = *self.release_since.get_or_insert(now);
            if self.active && now.saturating_sub(since) >= HYSTERESIS_MS {
                tracing::debug!(now, "zupt released");
                self.active = false;
            }
            return false;
        }

        if !window.iter().all(|s| self.is_quiet(s)) {
            // Quiet again, but the disturbance is still inside the window.
            if self.active {
                let since = *self.release_since.get_or_insert(now);
                if now.saturating_sub(since) < HYSTERESIS_MS {
                    return true;
                }
                tracing::debug!(now, "zupt released");
                self.active = false;
            }
            self.stationary_since = None;
            self.release_since = None;
            return false;
        }

        self.release_since = None;
        let start = *self.stationary_since.get_or_insert(now);
        let held = now.saturating_sub(start) >= self.params.min_hold_ms;
        if held && !self.active {
            tracing::debug!(now, hold_ms = now - start, "zupt latched");
        }
        self.active = held;
        self.active
    }
}
