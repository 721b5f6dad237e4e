//! Vertical-only rep counter.
//!
//! Driven with the filtered vertical position/velocity (cm, cm/s), a tilt
//! error in degrees, and the sample timestamp. Completed reps are returned
//! from `step` and mirrored onto an event channel; consumers (the fusion
//! loop among them) subscribe instead of being called back, so the detector
//! holds no pointer into the filter.

use bartrack_config::RepParams;
use crossbeam_channel::{Receiver, Sender, bounded};

/// Position band around the tracked top that counts as "still at the top".
const STABLE_BAND_CM: f64 = 5.0;
/// Consecutive stable samples required to enter lockout.
const STABLE_SAMPLES: u32 = 3;
/// Queued events before the channel starts shedding (subscriber lag is not
/// allowed to stall the hot path).
const EVENT_QUEUE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepState {
    Waiting,
    Descending,
    Ascending,
    Lockout,
}

/// A completed repetition. All metrics are rounded integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepEvent {
    /// 1-based, strictly increasing within a session.
    pub number: u32,
    pub timestamp_ms: u64,
    pub duration_ms: u64,
    /// Mean |vertical velocity| over the rep (cm/s).
    pub avg_speed_cms: u32,
    /// Peak |vertical velocity| over the rep (cm/s).
    pub peak_speed_cms: u32,
    /// Top minus bottom (cm).
    pub rom_cm: u32,
    /// 100 minus ten times the mean |tilt error|, floored at 0.
    pub balance_percent: u32,
}

/// Accumulators scoped to one open rep. Plain sums, no per-sample heap.
#[derive(Debug, Clone, Copy)]
struct OpenRep {
    start_ms: u64,
    top_cm: f64,
    bottom_cm: f64,
    speed_sum: f64,
    speed_peak: f64,
    tilt_sum: f64,
    samples: u32,
}

impl OpenRep {
    fn new(start_ms: u64, pos_cm: f64) -> Self {
        Self {
            start_ms,
            top_cm: pos_cm,
            bottom_cm: pos_cm,
            speed_sum: 0.0,
            speed_peak: 0.0,
            tilt_sum: 0.0,
            samples: 0,
        }
    }

    fn track(&mut self, vel_cms: f64, tilt_deg: f64) {
        let speed = vel_cms.abs();
        self.speed_sum += speed;
        self.speed_peak = self.speed_peak.max(speed);
        self.tilt_sum += tilt_deg.abs();
        self.samples += 1;
    }

    fn rom_cm(&self) -> f64 {
        self.top_cm - self.bottom_cm
    }
}

#[derive(Debug)]
pub struct RepDetector {
    params: RepParams,
    state: RepState,
    rep: Option<OpenRep>,
    stable_count: u32,
    lockout_since_ms: Option<u64>,
    completed: u32,
    events_tx: Sender<RepEvent>,
    events_rx: Receiver<RepEvent>,
}

impl RepDetector {
    pub fn new(params: RepParams) -> Self {
        let (events_tx, events_rx) = bounded(EVENT_QUEUE);
        Self {
            params,
            state: RepState::Waiting,
            rep: None,
            stable_count: 0,
            lockout_since_ms: None,
            completed: 0,
            events_tx,
            events_rx,
        }
    }

    /// New receiver on the completed-rep stream.
    pub fn subscribe(&self) -> Receiver<RepEvent> {
        self.events_rx.clone()
    }

    pub fn state(&self) -> RepState {
        self.state
    }

    pub fn completed_reps(&self) -> u32 {
        self.completed
    }

    pub fn set_params(&mut self, params: RepParams) {
        self.params = params;
    }

    /// Abandon any open rep; the session rep count is kept.
    pub fn reset(&mut self) {
        self.state = RepState::Waiting;
        self.rep = None;
        self.stable_count = 0;
        self.lockout_since_ms = None;
    }

    /// Advance with one sample. Returns the completed rep, if this sample
    /// finished one.
    pub fn step(
        &mut self,
        pos_cm: f64,
        vel_cms: f64,
        tilt_deg: f64,
        now_ms: u64,
    ) -> Option<RepEvent> {
        if let Some(rep) = self.rep.as_mut() {
            rep.track(vel_cms, tilt_deg);
        }
        match self.state {
            RepState::Waiting => {
                if vel_cms < self.params.descent_velocity_cms {
                    let mut rep = OpenRep::new(now_ms, pos_cm);
                    rep.track(vel_cms, tilt_deg);
                    self.rep = Some(rep);
                    self.stable_count = 0;
                    self.state = RepState::Descending;
                    tracing::debug!(now_ms, pos_cm, "rep descent started");
                }
                None
            }
            RepState::Descending => {
                let Some(rep) = self.rep.as_mut() else {
                    self.state = RepState::Waiting;
                    return None;
                };
                rep.bottom_cm = rep.bottom_cm.min(pos_cm);
                if vel_cms > self.params.ascent_velocity_cms {
                    self.stable_count = 0;
                    self.state = RepState::Ascending;
                }
                None
            }
            RepState::Ascending => {
                let Some(rep) = self.rep.as_mut() else {
                    self.state = RepState::Waiting;
                    return None;
                };
                rep.top_cm = rep.top_cm.max(pos_cm);
                if vel_cms < self.params.descent_velocity_cms {
                    // Dropped again before lockout: either a partial to
                    // discard or the start of a deeper attempt.
                    if rep.rom_cm() < self.params.min_rom_cm {
                        self.discard("partial below min ROM");
                    } else {
                        rep.bottom_cm = pos_cm;
                        self.stable_count = 0;
                        self.state = RepState::Descending;
                    }
                    return None;
                }
                let stable = (rep.top_cm - pos_cm).abs() < STABLE_BAND_CM
                    && vel_cms.abs() < self.params.lockout_velocity_cms;
                self.stable_count = if stable { self.stable_count + 1 } else { 0 };
                if self.stable_count >= STABLE_SAMPLES {
                    self.lockout_since_ms = Some(now_ms);
                    self.state = RepState::Lockout;
                    tracing::debug!(now_ms, top_cm = rep.top_cm, "lockout entered");
                }
                None
            }
            RepState::Lockout => self.step_lockout(pos_cm, vel_cms, now_ms),
        }
    }

    fn step_lockout(&mut self, pos_cm: f64, vel_cms: f64, now_ms: u64) -> Option<RepEvent> {
        let Some(rep) = self.rep.as_mut() else {
            self.state = RepState::Waiting;
            return None;
        };
        if vel_cms.abs() > self.params.lockout_velocity_cms {
            if vel_cms < self.params.descent_velocity_cms {
                rep.bottom_cm = pos_cm;
                self.stable_count = 0;
                self.lockout_since_ms = None;
                self.state = RepState::Descending;
            } else {
                self.discard("unstable lockout");
            }
            return None;
        }
        let since = self.lockout_since_ms.unwrap_or(now_ms);
        if now_ms.saturating_sub(since) < self.params.lockout_duration_ms {
            return None;
        }
        if rep.rom_cm() < self.params.min_rom_cm {
            self.discard("held lockout below min ROM");
            return None;
        }

        let rep = *rep;
        self.completed += 1;
        let n = rep.samples.max(1) as f64;
        let mean_tilt = rep.tilt_sum / n;
        let event = RepEvent {
            number: self.completed,
            timestamp_ms: now_ms,
            duration_ms: now_ms.saturating_sub(rep.start_ms),
            avg_speed_cms: to_rounded_u32(rep.speed_sum / n),
            peak_speed_cms: to_rounded_u32(rep.speed_peak),
            rom_cm: to_rounded_u32(rep.rom_cm()),
            balance_percent: to_rounded_u32((100.0 - 10.0 * mean_tilt).max(0.0)),
        };
        tracing::info!(
            number = event.number,
            rom_cm = event.rom_cm,
            duration_ms = event.duration_ms,
            "rep completed"
        );
        // Subscriber lag sheds events instead of blocking the sample path.
        if self.events_tx.try_send(event).is_err() {
            tracing::warn!(number = event.number, "rep event queue full, event dropped");
        }
        self.rep = None;
        self.stable_count = 0;
        self.lockout_since_ms = None;
        self.state = RepState::Waiting;
        Some(event)
    }

    fn discard(&mut self, why: &'static str) {
        tracing::debug!(why, "rep discarded");
        self.rep = None;
        self.stable_count = 0;
        self.lockout_since_ms = None;
        self.state = RepState::Waiting;
    }
}

#[inline]
fn to_rounded_u32(v: f64) -> u32 {
    if v.is_finite() && v > 0.0 {
        v.round().min(f64::from(u32::MAX)) as u32
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waiting_ignores_slow_drift() {
        let mut d = RepDetector::new(RepParams::default());
        for k in 0..10u64 {
            assert_eq!(d.step(-0.1 * k as f64, -1.0, 0.0, k * 50), None);
        }
        assert_eq!(d.state(), RepState::Waiting);
    }

    #[test]
    fn partial_rep_below_min_rom_is_discarded() {
        let mut d = RepDetector::new(RepParams::default());
        // Drop 8 cm, come back up, then dive again: ROM (8) < 15.
        d.step(0.0, -10.0, 0.0, 0);
        d.step(-8.0, -10.0, 0.0, 400);
        d.step(-6.0, 10.0, 0.0, 600);
        d.step(-2.0, 10.0, 0.0, 800);
        assert_eq!(d.state(), RepState::Ascending);
        d.step(-3.0, -10.0, 0.0, 1000);
        assert_eq!(d.state(), RepState::Waiting);
        assert_eq!(d.completed_reps(), 0);
    }
}
