#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Persisted parameter schema for the bar-tracking system.
//!
//! `UserParams` is the single typed bundle the parameter store keeps per
//! user, serialized as a TOML blob. Every field carries a published default
//! and deserialization fills anything missing, so blobs written by older
//! versions keep loading. Updates are total replacement of a sub-struct,
//! never field-level merges.
use serde::{Deserialize, Serialize};

/// Error-state Kalman filter noise parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EkfParams {
    /// Velocity process noise power (m²/s⁴).
    pub qv: f64,
    /// Accelerometer bias random walk ((m/s²)²/s).
    pub qba: f64,
    /// ZUPT measurement noise (m²/s²).
    pub rv: f64,
    /// Lateral-constraint measurement noise (m²).
    pub ry: f64,
}

impl Default for EkfParams {
    fn default() -> Self {
        Self {
            qv: 5e-4,
            qba: 1e-6,
            rv: 2e-4,
            ry: 5e-3,
        }
    }
}

/// Zero-velocity detector thresholds.
///
/// The hysteresis release window is a fixed internal constant of the
/// detector, not a tunable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZuptParams {
    /// Gravity-removed accel magnitude threshold (m/s²).
    pub accel_thresh: f64,
    /// Gyro magnitude threshold (rad/s).
    pub gyro_thresh: f64,
    /// Minimum continuous quiet time before the detector latches (ms).
    pub min_hold_ms: u64,
}

impl Default for ZuptParams {
    fn default() -> Self {
        Self {
            accel_thresh: 0.5,
            gyro_thresh: 0.4,
            min_hold_ms: 200,
        }
    }
}

/// Rep-counter thresholds. Velocities are vertical, in cm/s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepParams {
    /// Minimum range of motion for a countable rep (cm).
    pub min_rom_cm: f64,
    /// Descent trigger velocity; must be negative (cm/s).
    pub descent_velocity_cms: f64,
    /// Ascent trigger velocity; must be positive (cm/s).
    pub ascent_velocity_cms: f64,
    /// Stability band for the lockout phase (cm/s).
    pub lockout_velocity_cms: f64,
    /// How long the bar must stay locked out before the rep counts (ms).
    pub lockout_duration_ms: u64,
}

impl Default for RepParams {
    fn default() -> Self {
        Self {
            min_rom_cm: 15.0,
            descent_velocity_cms: -3.0,
            ascent_velocity_cms: 3.0,
            lockout_velocity_cms: 2.0,
            lockout_duration_ms: 300,
        }
    }
}

/// Horizontal axis of the local level frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LateralAxis {
    /// East.
    X,
    /// North.
    Y,
}

/// Motion-constraint selection for the lateral channels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ConstraintCfg {
    /// No lateral constraint.
    #[default]
    None,
    /// Bar moves in a vertical plane; the named axis is pinned to zero.
    VerticalPlane { axis: LateralAxis },
    /// Bar moves along a vertical line; the anchor point is learned at the
    /// first stationary detection and lives in the fusion loop, not here.
    LineVertical,
}

/// Workout preferences surfaced to the rep detector and the UI.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkoutPrefs {
    /// Tilt beyond this is reported as form error (degrees).
    pub max_tilt_deg: f64,
    /// Preferred minimum range of motion (cm).
    pub min_rom_cm: f64,
    /// Rest timer between sets (seconds).
    pub rest_timer_s: u32,
}

impl Default for WorkoutPrefs {
    fn default() -> Self {
        Self {
            max_tilt_deg: 10.0,
            min_rom_cm: 15.0,
            rest_timer_s: 90,
        }
    }
}

/// Sensor/device settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceCfg {
    /// Requested IMU output rate (Hz).
    pub sample_rate_hz: u32,
    /// Run the guided calibration automatically on first connect.
    pub auto_calibrate: bool,
}

impl Default for DeviceCfg {
    fn default() -> Self {
        Self {
            sample_rate_hz: 20,
            auto_calibrate: false,
        }
    }
}

/// Where the sensor sits on the bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MountPreset {
    /// Clipped onto the end cap of the sleeve.
    #[default]
    EndCap,
    /// Strapped inside the collar.
    Collar,
    /// Centered on the shaft.
    Center,
}

/// Bar-mounting settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BarCfg {
    pub mount: MountPreset,
    /// Skip the guided calibration and run on the published defaults.
    pub calibrationless: bool,
}

impl Default for BarCfg {
    fn default() -> Self {
        Self {
            mount: MountPreset::EndCap,
            calibrationless: false,
        }
    }
}

/// The complete per-user parameter bundle (the persistence surface).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserParams {
    /// Sanity cap on the gravity-removed acceleration magnitude (m/s²);
    /// vectors beyond it are rescaled to this length. Declared ahead of the
    /// sub-tables so TOML emits it at the top level.
    pub accel_cutoff_mps2: f64,
    pub ekf: EkfParams,
    pub zupt: ZuptParams,
    pub rep: RepParams,
    pub workout: WorkoutPrefs,
    pub device: DeviceCfg,
    pub bar: BarCfg,
    pub constraint: ConstraintCfg,
}

impl Default for UserParams {
    fn default() -> Self {
        Self {
            accel_cutoff_mps2: 40.0,
            ekf: EkfParams::default(),
            zupt: ZuptParams::default(),
            rep: RepParams::default(),
            workout: WorkoutPrefs::default(),
            device: DeviceCfg::default(),
            bar: BarCfg::default(),
            constraint: ConstraintCfg::default(),
        }
    }
}

/// Parse a TOML text into `UserParams`; missing fields become defaults.
pub fn load_toml(s: &str) -> Result<UserParams, toml::de::Error> {
    toml::from_str::<UserParams>(s)
}

/// Decode a persisted blob. Non-UTF-8 or malformed TOML is an error; the
/// caller decides whether to fall back to defaults.
pub fn from_blob(blob: &[u8]) -> eyre::Result<UserParams> {
    let text = std::str::from_utf8(blob).map_err(|e| eyre::eyre!("params blob not UTF-8: {e}"))?;
    load_toml(text).map_err(|e| eyre::eyre!("params blob not valid TOML: {e}"))
}

/// Encode the bundle as an opaque blob for the store.
pub fn to_blob(params: &UserParams) -> eyre::Result<Vec<u8>> {
    let text =
        toml::to_string_pretty(params).map_err(|e| eyre::eyre!("serialize params: {e}"))?;
    Ok(text.into_bytes())
}

impl UserParams {
    pub fn validate(&self) -> eyre::Result<()> {
        // EKF noise powers
        if !(self.ekf.qv.is_finite() && self.ekf.qv > 0.0) {
            eyre::bail!("ekf.qv must be finite and > 0");
        }
        if !(self.ekf.qba.is_finite() && self.ekf.qba >= 0.0) {
            eyre::bail!("ekf.qba must be finite and >= 0");
        }
        if !(self.ekf.rv.is_finite() && self.ekf.rv > 0.0) {
            eyre::bail!("ekf.rv must be finite and > 0");
        }
        if !(self.ekf.ry.is_finite() && self.ekf.ry > 0.0) {
            eyre::bail!("ekf.ry must be finite and > 0");
        }

        // ZUPT thresholds
        if !(self.zupt.accel_thresh.is_finite() && self.zupt.accel_thresh > 0.0) {
            eyre::bail!("zupt.accel_thresh must be finite and > 0");
        }
        if !(self.zupt.gyro_thresh.is_finite() && self.zupt.gyro_thresh > 0.0) {
            eyre::bail!("zupt.gyro_thresh must be finite and > 0");
        }
        if self.zupt.min_hold_ms == 0 {
            eyre::bail!("zupt.min_hold_ms must be >= 1");
        }
        if self.zupt.min_hold_ms > 10_000 {
            eyre::bail!("zupt.min_hold_ms is unreasonably large (>10s)");
        }

        // Rep detector
        if !(self.rep.min_rom_cm.is_finite() && self.rep.min_rom_cm > 0.0) {
            eyre::bail!("rep.min_rom_cm must be finite and > 0");
        }
        if !(self.rep.descent_velocity_cms.is_finite() && self.rep.descent_velocity_cms < 0.0) {
            eyre::bail!("rep.descent_velocity_cms must be finite and < 0");
        }
        if !(self.rep.ascent_velocity_cms.is_finite() && self.rep.ascent_velocity_cms > 0.0) {
            eyre::bail!("rep.ascent_velocity_cms must be finite and > 0");
        }
        if !(self.rep.lockout_velocity_cms.is_finite() && self.rep.lockout_velocity_cms > 0.0) {
            eyre::bail!("rep.lockout_velocity_cms must be finite and > 0");
        }
        if self.rep.lockout_duration_ms > 5_000 {
            eyre::bail!("rep.lockout_duration_ms is unreasonably large (>5s)");
        }

        // Workout / device / sanity limit
        if !(self.workout.max_tilt_deg.is_finite() && self.workout.max_tilt_deg > 0.0) {
            eyre::bail!("workout.max_tilt_deg must be finite and > 0");
        }
        if self.device.sample_rate_hz == 0 {
            eyre::bail!("device.sample_rate_hz must be > 0");
        }
        if !(self.accel_cutoff_mps2.is_finite() && self.accel_cutoff_mps2 > 0.0) {
            eyre::bail!("accel_cutoff_mps2 must be finite and > 0");
        }

        Ok(())
    }
}
