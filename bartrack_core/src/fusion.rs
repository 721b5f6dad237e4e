//! The per-sample orchestrator: decode → mechanize → window → ZUPT → filter
//! → clip → rep detection → diagnostics.
//!
//! Owns every hot-path component exclusively and runs single-threaded in
//! arrival order. Per the error policy, nothing here returns an error per
//! sample: bad input is dropped, bad timing skips the prediction, and
//! out-of-envelope state is clamped.

use crate::diagnostics::{Diagnostics, channel};
use crate::error::{BuildError, Result};
use crate::eskf::Eskf;
use crate::frames::{self, Frame};
use crate::mechanize::{clamp_accel, mechanize};
use crate::rep::{RepDetector, RepEvent};
use crate::sample::{ImuSample, norm3};
use crate::window::SampleWindow;
use crate::zupt::ZuptDetector;
use bartrack_config::{ConstraintCfg, UserParams};
use crossbeam_channel::{Receiver, Sender, bounded};

// -- Safety envelope --
pub const MAX_SPEED_MPS: f64 = 3.0;
pub const FLOOR_M: f64 = -0.05;
pub const LATERAL_LIMIT_M: f64 = 2.5;
pub const CEILING_M: f64 = 3.0;

// -- Timing --
pub const MAX_DT_S: f64 = 0.2;
pub const EXPECTED_DT_S: f64 = 0.05;
pub const RATE_EMA_ALPHA: f64 = 0.1;

/// Vertical residual left in place after a ZUPT so downstream consumers of
/// the vertical velocity never sit on a hard zero.
pub const ZUPT_RESIDUAL_UP_MPS: f64 = 0.001;
/// Below this speed the lateral constraints stay out of the way.
pub const CONSTRAINT_MIN_SPEED_MPS: f64 = 0.05;

const REP_FANOUT_QUEUE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingStatus {
    /// No sample seen yet.
    Uninitialized,
    /// Samples flowing, still waiting for the first stationary fix.
    Waiting,
    /// First ZUPT applied; estimates are trustworthy.
    Initialized,
}

/// Published after every processed sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateSnapshot {
    pub timestamp_ms: u64,
    /// ENU position (m).
    pub position: [f64; 3],
    /// ENU velocity (m/s).
    pub velocity: [f64; 3],
    /// Accelerometer bias estimate (m/s²).
    pub bias: [f64; 3],
    pub zupt_active: bool,
    pub status: TrackingStatus,
    /// EMA-smoothed loop rate (Hz).
    pub loop_rate_hz: f64,
    /// |dt − expected| of the latest step (s).
    pub dt_jitter_s: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutput {
    pub snapshot: StateSnapshot,
    /// Rep completed by this sample, if any.
    pub rep: Option<RepEvent>,
    /// True when the sample only advanced the clock (timing anomaly or
    /// first sample).
    pub skipped: bool,
}

/// Degradation counters, exposed for diagnostics surfaces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FusionCounters {
    pub invalid_samples: u64,
    pub timing_anomalies: u64,
    pub filter_resets: u64,
}

pub struct FusionLoop {
    params: UserParams,
    eskf: Eskf,
    window: SampleWindow,
    zupt: ZuptDetector,
    rep: RepDetector,
    rep_stream: Receiver<RepEvent>,
    rep_fanout: Vec<Sender<RepEvent>>,
    diag: Diagnostics,
    status: TrackingStatus,
    last_timestamp_ms: Option<u64>,
    anchor: Option<(f64, f64)>,
    zupt_active: bool,
    loop_rate_hz: f64,
    dt_jitter_s: f64,
    counters: FusionCounters,
}

impl core::fmt::Debug for FusionLoop {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FusionLoop")
            .field("status", &self.status)
            .field("zupt_active", &self.zupt_active)
            .field("position", &self.eskf.position())
            .finish()
    }
}

/// Builder with config validation; every knob has a published default.
#[derive(Debug, Default)]
pub struct FusionLoopBuilder {
    params: Option<UserParams>,
    window_capacity: Option<usize>,
    diagnostics_depth: Option<usize>,
}

impl FusionLoopBuilder {
    pub fn with_params(mut self, params: UserParams) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_window_capacity(mut self, capacity: usize) -> Self {
        self.window_capacity = Some(capacity);
        self
    }

    pub fn with_diagnostics_depth(mut self, depth: usize) -> Self {
        self.diagnostics_depth = Some(depth);
        self
    }

    pub fn build(self) -> Result<FusionLoop> {
        let params = self.params.unwrap_or_default();
        params.validate()?;
        let window_capacity = self
            .window_capacity
            .unwrap_or(crate::window::DEFAULT_WINDOW_CAPACITY);
        if window_capacity < 2 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "window capacity must be >= 2",
            )));
        }
        let diagnostics_depth = self
            .diagnostics_depth
            .unwrap_or(crate::diagnostics::DEFAULT_SERIES_DEPTH);

        let rep = RepDetector::new(params.rep);
        let rep_stream = rep.subscribe();
        Ok(FusionLoop {
            eskf: Eskf::new(params.ekf),
            window: SampleWindow::with_capacity(window_capacity),
            zupt: ZuptDetector::new(params.zupt),
            rep,
            rep_stream,
            rep_fanout: Vec::new(),
            diag: Diagnostics::with_depth(diagnostics_depth),
            status: TrackingStatus::Uninitialized,
            last_timestamp_ms: None,
            anchor: None,
            zupt_active: false,
            loop_rate_hz: 0.0,
            dt_jitter_s: 0.0,
            counters: FusionCounters::default(),
            params,
        })
    }
}

impl FusionLoop {
    pub fn builder() -> FusionLoopBuilder {
        FusionLoopBuilder::default()
    }

    /// Build with the given parameter bundle and default sizing.
    pub fn new(params: UserParams) -> Result<Self> {
        Self::builder().with_params(params).build()
    }

    pub fn status(&self) -> TrackingStatus {
        self.status
    }

    pub fn zupt_active(&self) -> bool {
        self.zupt_active
    }

    pub fn counters(&self) -> FusionCounters {
        self.counters
    }

    pub fn anchor(&self) -> Option<(f64, f64)> {
        self.anchor
    }

    pub fn params(&self) -> &UserParams {
        &self.params
    }

    pub fn completed_reps(&self) -> u32 {
        self.rep.completed_reps()
    }

    /// Diagnostics hub (stats queries and channel subscriptions).
    pub fn diagnostics(&mut self) -> &mut Diagnostics {
        &mut self.diag
    }

    /// Subscribe to completed reps. The fusion loop consumes the detector's
    /// stream (it owns the filter reset) and fans events out from here.
    pub fn subscribe_reps(&mut self) -> Receiver<RepEvent> {
        let (tx, rx) = bounded(REP_FANOUT_QUEUE);
        self.rep_fanout.push(tx);
        rx
    }

    /// Replace the whole parameter bundle; detector thresholds swap in
    /// atomically at the next sample.
    pub fn apply_params(&mut self, params: UserParams) -> Result<()> {
        params.validate()?;
        self.eskf.set_params(params.ekf);
        self.zupt.set_params(params.zupt);
        self.rep.set_params(params.rep);
        self.params = params;
        Ok(())
    }

    /// User-level reset: everything back to cold start. The session rep
    /// count survives.
    pub fn reset(&mut self) {
        self.eskf.reset();
        self.window.clear();
        self.zupt.reset();
        self.rep.reset();
        self.status = TrackingStatus::Uninitialized;
        self.last_timestamp_ms = None;
        self.anchor = None;
        self.zupt_active = false;
        self.loop_rate_hz = 0.0;
        self.dt_jitter_s = 0.0;
        tracing::info!("tracking reset");
    }

    /// Decode a raw frame and run the pipeline when it carries a sample.
    /// Non-data frames and undecodable bytes produce `None`.
    pub fn ingest(&mut self, bytes: &[u8], timestamp_ms: u64) -> Option<StepOutput> {
        match frames::decode(bytes, timestamp_ms) {
            Some(Frame::Data(sample)) => self.step(sample),
            _ => None,
        }
    }

    /// Run one sample through the pipeline.
    pub fn step(&mut self, sample: ImuSample) -> Option<StepOutput> {
        if !sample.is_valid() {
            self.counters.invalid_samples += 1;
            tracing::trace!(ts = sample.timestamp_ms, "non-finite sample dropped");
            return None;
        }
        let si = sample.to_si();
        let now = si.timestamp_ms;

        self.record_raw(&si);
        let mut enu = mechanize(&si);
        clamp_accel(&mut enu.a_enu, self.params.accel_cutoff_mps2);
        self.window.push(enu);
        self.record_enu(&enu);

        let Some(last) = self.last_timestamp_ms else {
            // First sample: establish the time base only.
            self.last_timestamp_ms = Some(now);
            if self.status == TrackingStatus::Uninitialized {
                self.status = TrackingStatus::Waiting;
            }
            self.record_state(now, &enu);
            self.diag.publish(now);
            return Some(self.output(now, None, true));
        };

        let dt = (now as i64 - last as i64) as f64 / 1000.0;
        self.last_timestamp_ms = Some(now);
        if dt <= 0.0 || dt > MAX_DT_S {
            self.counters.timing_anomalies += 1;
            tracing::warn!(dt, "timing anomaly, prediction skipped");
            self.record_state(now, &enu);
            self.diag.publish(now);
            return Some(self.output(now, None, true));
        }

        let instantaneous_hz = dt.recip();
        self.loop_rate_hz = if self.loop_rate_hz > 0.0 {
            RATE_EMA_ALPHA * instantaneous_hz + (1.0 - RATE_EMA_ALPHA) * self.loop_rate_hz
        } else {
            instantaneous_hz
        };
        self.dt_jitter_s = (dt - EXPECTED_DT_S).abs();

        self.eskf.predict(dt, enu.a_enu);

        self.zupt_active = self.zupt.update(&self.window);
        if self.zupt_active {
            self.eskf.zupt_update();
            self.eskf.apply_velocity_floor(ZUPT_RESIDUAL_UP_MPS);
            if self.anchor.is_none() {
                let p = self.eskf.position();
                self.anchor = Some((p[0], p[1]));
                tracing::info!(east = p[0], north = p[1], "lateral anchor learned");
            }
            if self.status != TrackingStatus::Initialized {
                self.status = TrackingStatus::Initialized;
                tracing::info!(now, "tracking initialized");
            }
        } else if self.status == TrackingStatus::Initialized
            && self.eskf.speed() > CONSTRAINT_MIN_SPEED_MPS
        {
            match self.params.constraint {
                ConstraintCfg::None => {}
                ConstraintCfg::VerticalPlane { axis } => self.eskf.planar_update(axis),
                ConstraintCfg::LineVertical => {
                    if let Some((east, north)) = self.anchor {
                        self.eskf.line_vertical_update(east, north);
                    }
                }
            }
        }

        self.clip_envelope();

        let p = self.eskf.position();
        let v = self.eskf.velocity();
        let tilt_deg = tilt_error_deg(&si.euler);
        let rep = self.rep.step(p[2] * 100.0, v[2] * 100.0, tilt_deg, now);

        // The detector publishes; we are its subscriber and own the reset.
        while let Ok(event) = self.rep_stream.try_recv() {
            self.reset_filter_after_rep(&event);
            self.rep_fanout.retain(|tx| match tx.try_send(event) {
                Ok(()) => true,
                Err(crossbeam_channel::TrySendError::Full(_)) => true,
                Err(crossbeam_channel::TrySendError::Disconnected(_)) => false,
            });
        }

        self.record_state(now, &enu);
        self.diag.publish(now);
        Some(self.output(now, rep, false))
    }

    fn reset_filter_after_rep(&mut self, event: &RepEvent) {
        self.eskf.reset();
        self.counters.filter_resets += 1;
        tracing::debug!(rep = event.number, "filter reset at rep completion");
    }

    fn clip_envelope(&mut self) {
        let v = self.eskf.velocity();
        let speed = norm3(&v);
        if speed > MAX_SPEED_MPS {
            let k = MAX_SPEED_MPS / speed;
            self.eskf.set_velocity([v[0] * k, v[1] * k, v[2] * k]);
            tracing::trace!(speed, "velocity clipped");
        }
        let p = self.eskf.position();
        let v = self.eskf.velocity();
        if p[2] < FLOOR_M {
            self.eskf.set_position_component(2, FLOOR_M);
            if v[2] < 0.0 {
                self.eskf.set_velocity_component(2, 0.0);
            }
        }
        for axis in 0..2 {
            if p[axis].abs() > LATERAL_LIMIT_M {
                self.eskf
                    .set_position_component(axis, p[axis].clamp(-LATERAL_LIMIT_M, LATERAL_LIMIT_M));
                self.eskf.set_velocity_component(axis, 0.0);
            }
        }
        let p = self.eskf.position();
        if p[2] > CEILING_M {
            self.eskf.set_position_component(2, CEILING_M);
            if self.eskf.velocity()[2] > 0.0 {
                self.eskf.set_velocity_component(2, 0.0);
            }
        }
    }

    fn record_raw(&mut self, si: &crate::sample::Imu20) {
        let ts = si.timestamp_ms;
        self.diag.record(channel::ACCEL_X, ts, si.accel[0]);
        self.diag.record(channel::ACCEL_Y, ts, si.accel[1]);
        self.diag.record(channel::ACCEL_Z, ts, si.accel[2]);
        self.diag.record(channel::ACCEL_MAG, ts, si.accel_norm());
        self.diag.record(channel::GYRO_X, ts, si.gyro[0]);
        self.diag.record(channel::GYRO_Y, ts, si.gyro[1]);
        self.diag.record(channel::GYRO_Z, ts, si.gyro[2]);
        self.diag.record(channel::GYRO_MAG, ts, si.gyro_norm());
    }

    fn record_enu(&mut self, enu: &crate::sample::EnuSample) {
        let ts = enu.timestamp_ms;
        self.diag.record(channel::ENU_X, ts, enu.a_enu[0]);
        self.diag.record(channel::ENU_Y, ts, enu.a_enu[1]);
        self.diag.record(channel::ENU_Z, ts, enu.a_enu[2]);
        self.diag.record(channel::ENU_MAG, ts, enu.accel_norm());
        if let Some(mean) = self.diag.mean_recent(channel::ENU_Z, ts, 1_000) {
            self.diag.record(channel::ENU_Z_MEAN_1S, ts, mean);
        }
    }

    fn record_state(&mut self, ts: u64, enu: &crate::sample::EnuSample) {
        let p = self.eskf.position();
        let v = self.eskf.velocity();
        let b = self.eskf.bias();
        self.diag.record(channel::POS_E, ts, p[0]);
        self.diag.record(channel::POS_N, ts, p[1]);
        self.diag.record(channel::POS_U, ts, p[2]);
        self.diag.record(channel::VEL_E, ts, v[0]);
        self.diag.record(channel::VEL_N, ts, v[1]);
        self.diag.record(channel::VEL_U, ts, v[2]);
        self.diag.record(channel::VEL_MAG, ts, norm3(&v));
        self.diag.record(channel::BIAS_E, ts, b[0]);
        self.diag.record(channel::BIAS_N, ts, b[1]);
        self.diag.record(channel::BIAS_U, ts, b[2]);
        self.diag
            .record(channel::RESIDUAL_UP, ts, enu.a_enu[2] - b[2]);
        self.diag
            .record(channel::ZUPT_ACTIVE, ts, f64::from(u8::from(self.zupt_active)));
        self.diag.record(channel::LOOP_RATE, ts, self.loop_rate_hz);
        self.diag.record(channel::DT_JITTER, ts, self.dt_jitter_s);
    }

    fn output(&self, timestamp_ms: u64, rep: Option<RepEvent>, skipped: bool) -> StepOutput {
        StepOutput {
            snapshot: StateSnapshot {
                timestamp_ms,
                position: self.eskf.position(),
                velocity: self.eskf.velocity(),
                bias: self.eskf.bias(),
                zupt_active: self.zupt_active,
                status: self.status,
                loop_rate_hz: self.loop_rate_hz,
                dt_jitter_s: self.dt_jitter_s,
            },
            rep,
            skipped,
        }
    }
}

/// Bar tilt relative to level, in degrees.
fn tilt_error_deg(euler_rad: &[f64; 3]) -> f64 {
    let [roll, pitch, _] = *euler_rad;
    (roll * roll + pitch * pitch).sqrt().to_degrees()
}
