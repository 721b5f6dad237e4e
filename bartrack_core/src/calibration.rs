//! Guided calibration: four capture phases that teach the ZUPT detector
//! what this sensor's "quiet" looks like.
//!
//! The operator holds the bar still, moves it slowly, moves it fast, and
//! holds it still again; the analysis turns the captured magnitudes into
//! recommended thresholds plus a confidence score. An aborted or starved
//! capture yields a zero-confidence result with a reason, never an error.

use crate::sample::Imu20;
use bartrack_config::ZuptParams;

/// Minimum time the operator must spend in each phase before advancing.
pub const MIN_PHASE_MS: u64 = 2_000;
/// Below this many stationary samples the analysis refuses to recommend.
const MIN_STATIONARY_SAMPLES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationPhase {
    Idle,
    Stationary,
    SlowMotion,
    FastMotion,
    Verification,
    Complete,
}

impl CalibrationPhase {
    fn next(self) -> Self {
        match self {
            Self::Idle => Self::Stationary,
            Self::Stationary => Self::SlowMotion,
            Self::SlowMotion => Self::FastMotion,
            Self::FastMotion => Self::Verification,
            Self::Verification | Self::Complete => Self::Complete,
        }
    }
}

/// Magnitude capture for one phase.
#[derive(Debug, Default, Clone)]
struct PhaseCapture {
    started_ms: u64,
    duration_ms: u64,
    gyro_mags: Vec<f64>,
    accel_mags: Vec<f64>,
    dts: Vec<f64>,
}

/// Outcome of a completed (or failed) calibration run.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationResult {
    pub recommended: ZuptParams,
    /// In [0, 1]; 0 means "do not apply" and `reason` says why.
    pub confidence: f64,
    /// Std of stationary gyro magnitudes (rad/s).
    pub gyro_noise: f64,
    /// Std of stationary accel magnitudes (m/s²).
    pub accel_noise: f64,
    /// `max(0, 1 − std(dt)/mean(dt))` over the whole capture.
    pub timing_stability: f64,
    pub timing_stable: bool,
    pub reason: Option<String>,
}

impl CalibrationResult {
    fn rejected(reason: &str) -> Self {
        Self {
            recommended: ZuptParams::default(),
            confidence: 0.0,
            gyro_noise: 0.0,
            accel_noise: 0.0,
            timing_stability: 0.0,
            timing_stable: false,
            reason: Some(reason.to_string()),
        }
    }
}

#[derive(Debug)]
pub struct CalibrationSequencer {
    phase: CalibrationPhase,
    stationary: PhaseCapture,
    slow: PhaseCapture,
    fast: PhaseCapture,
    verification: PhaseCapture,
    last_timestamp_ms: Option<u64>,
}

impl Default for CalibrationSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl CalibrationSequencer {
    pub fn new() -> Self {
        Self {
            phase: CalibrationPhase::Idle,
            stationary: PhaseCapture::default(),
            slow: PhaseCapture::default(),
            fast: PhaseCapture::default(),
            verification: PhaseCapture::default(),
            last_timestamp_ms: None,
        }
    }

    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    /// Begin capturing; the first phase is the stationary hold.
    pub fn start(&mut self, now_ms: u64) {
        *self = Self::new();
        self.phase = CalibrationPhase::Stationary;
        self.stationary.started_ms = now_ms;
        tracing::info!(now_ms, "calibration started");
    }

    /// Feed one SI sample into the current phase's capture.
    pub fn push_sample(&mut self, sample: &Imu20) {
        let dt = self
            .last_timestamp_ms
            .map(|t| (sample.timestamp_ms.saturating_sub(t)) as f64 / 1000.0);
        self.last_timestamp_ms = Some(sample.timestamp_ms);
        let gyro = sample.gyro_norm();
        let accel = sample.accel_norm();
        let Some(capture) = self.current_capture_mut() else {
            return;
        };
        capture.gyro_mags.push(gyro);
        capture.accel_mags.push(accel);
        if let Some(dt) = dt
            && dt > 0.0
        {
            capture.dts.push(dt);
        }
    }

    /// Has the current phase run its minimum duration?
    pub fn can_advance(&self, now_ms: u64) -> bool {
        match self.current_capture() {
            Some(c) => now_ms.saturating_sub(c.started_ms) >= MIN_PHASE_MS,
            None => false,
        }
    }

    /// Close the current phase and open the next; `Verification` closes into
    /// the terminal `Complete`.
    pub fn advance_phase(&mut self, now_ms: u64) {
        let next = self.phase.next();
        if let Some(c) = self.current_capture_mut() {
            c.duration_ms = now_ms.saturating_sub(c.started_ms);
        }
        self.phase = next;
        if let Some(c) = self.current_capture_mut() {
            c.started_ms = now_ms;
        }
        tracing::info!(?next, "calibration phase advanced");
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn current_capture(&self) -> Option<&PhaseCapture> {
        match self.phase {
            CalibrationPhase::Stationary => Some(&self.stationary),
            CalibrationPhase::SlowMotion => Some(&self.slow),
            CalibrationPhase::FastMotion => Some(&self.fast),
            CalibrationPhase::Verification => Some(&self.verification),
            CalibrationPhase::Idle | CalibrationPhase::Complete => None,
        }
    }

    fn current_capture_mut(&mut self) -> Option<&mut PhaseCapture> {
        match self.phase {
            CalibrationPhase::Stationary => Some(&mut self.stationary),
            CalibrationPhase::SlowMotion => Some(&mut self.slow),
            CalibrationPhase::FastMotion => Some(&mut self.fast),
            CalibrationPhase::Verification => Some(&mut self.verification),
            CalibrationPhase::Idle | CalibrationPhase::Complete => None,
        }
    }

    /// Turn the captured phases into recommended thresholds.
    pub fn analyze(&self) -> CalibrationResult {
        if self.phase != CalibrationPhase::Complete {
            return CalibrationResult::rejected("calibration sequence not complete");
        }
        if self.stationary.gyro_mags.len() < MIN_STATIONARY_SAMPLES {
            return CalibrationResult::rejected("too few stationary samples");
        }

        let gyro_noise = std_dev(&self.stationary.gyro_mags);
        let accel_noise = std_dev(&self.stationary.accel_mags);

        let gyro_thresh = (5.0 * gyro_noise).clamp(0.05, 0.5);
        let accel_thresh = (5.0 * accel_noise).clamp(0.1, 1.0);
        let min_hold_ms = ((200.0 + 1000.0 * gyro_noise).round() as u64).clamp(100, 500);

        let mut confidence: f64 = 0.3;

        // The stationary hold itself must sit inside the recommended gates.
        let gyro_max = max_of(&self.stationary.gyro_mags);
        let accel_dev_max = self
            .stationary
            .accel_mags
            .iter()
            .map(|a| (a - 9.81).abs())
            .fold(0.0_f64, f64::max);
        if gyro_max < gyro_thresh && accel_dev_max < accel_thresh {
            confidence += 0.3;
        }

        // The motion phases must actually contain motion.
        if self.slow.gyro_mags.iter().any(|g| *g > 2.0 * gyro_thresh) {
            confidence += 0.2;
        }
        if self.fast.gyro_mags.iter().any(|g| *g > 5.0 * gyro_thresh) {
            confidence += 0.2;
        }
        confidence = confidence.min(1.0);

        let mut dts: Vec<f64> = Vec::new();
        for capture in [&self.stationary, &self.slow, &self.fast, &self.verification] {
            dts.extend_from_slice(&capture.dts);
        }
        let timing_stability = if dts.is_empty() {
            0.0
        } else {
            let mean = dts.iter().sum::<f64>() / dts.len() as f64;
            if mean > 0.0 {
                (1.0 - std_dev(&dts) / mean).max(0.0)
            } else {
                0.0
            }
        };

        CalibrationResult {
            recommended: ZuptParams {
                accel_thresh,
                gyro_thresh,
                min_hold_ms,
            },
            confidence,
            gyro_noise,
            accel_noise,
            timing_stability,
            timing_stable: timing_stability > 0.9,
            reason: None,
        }
    }
}

fn std_dev(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    let var = xs.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n;
    var.sqrt()
}

fn max_of(xs: &[f64]) -> f64 {
    xs.iter().copied().fold(0.0_f64, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_sequencer_rejects_analysis() {
        let seq = CalibrationSequencer::new();
        let result = seq.analyze();
        assert_eq!(result.confidence, 0.0);
        assert!(result.reason.is_some());
    }

    #[test]
    fn cannot_advance_before_minimum_phase_time() {
        let mut seq = CalibrationSequencer::new();
        seq.start(1_000);
        assert!(!seq.can_advance(2_500));
        assert!(seq.can_advance(3_000));
    }

    #[test]
    fn phase_order_ends_in_complete() {
        let mut seq = CalibrationSequencer::new();
        seq.start(0);
        let mut seen = vec![seq.phase()];
        for k in 1..=5 {
            seq.advance_phase(k * MIN_PHASE_MS);
            seen.push(seq.phase());
        }
        assert_eq!(
            seen,
            vec![
                CalibrationPhase::Stationary,
                CalibrationPhase::SlowMotion,
                CalibrationPhase::FastMotion,
                CalibrationPhase::Verification,
                CalibrationPhase::Complete,
                CalibrationPhase::Complete,
            ]
        );
    }
}
