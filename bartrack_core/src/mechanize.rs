//! Body-frame to local-level (ENU) mechanization.
//!
//! Orientation arrives from the sensor as Z-Y-X Euler angles; this module
//! only applies it. No smoothing happens here — the filter's process model
//! owns that.

use crate::sample::{EnuSample, Imu20, GRAVITY};

/// Pitch magnitude beyond which the Z-Y-X factorization degenerates; the
/// rotated acceleration is forced to zero instead of amplifying noise.
pub const GIMBAL_LOCK_PITCH_RAD: f64 = 1.48;

/// Row-major 3x3 direction cosine matrix, body → ENU, from Z-Y-X Euler
/// (yaw about Z, pitch about Y, roll about X).
pub fn dcm_body_to_enu(roll: f64, pitch: f64, yaw: f64) -> [f64; 9] {
    let (sr, cr) = roll.sin_cos();
    let (sp, cp) = pitch.sin_cos();
    let (sy, cy) = yaw.sin_cos();
    [
        cy * cp,
        cy * sp * sr - sy * cr,
        cy * sp * cr + sy * sr,
        sy * cp,
        sy * sp * sr + cy * cr,
        sy * sp * cr - cy * sr,
        -sp,
        cp * sr,
        cp * cr,
    ]
}

#[inline]
fn rotate(r: &[f64; 9], v: &[f64; 3]) -> [f64; 3] {
    [
        r[0] * v[0] + r[1] * v[1] + r[2] * v[2],
        r[3] * v[0] + r[4] * v[1] + r[5] * v[2],
        r[6] * v[0] + r[7] * v[1] + r[8] * v[2],
    ]
}

/// Rotate the body-frame specific force into ENU and remove gravity.
///
/// Near gimbal lock the linear acceleration is reported as zero; the sample
/// still flows through so the window and timing stay continuous.
pub fn mechanize(sample: &Imu20) -> EnuSample {
    let [roll, pitch, yaw] = sample.euler;
    let a_enu = if pitch.abs() > GIMBAL_LOCK_PITCH_RAD {
        tracing::trace!(pitch, "gimbal-lock guard engaged");
        [0.0; 3]
    } else {
        let r = dcm_body_to_enu(roll, pitch, yaw);
        let a = rotate(&r, &sample.accel);
        [a[0], a[1], a[2] - GRAVITY]
    };
    EnuSample {
        timestamp_ms: sample.timestamp_ms,
        a_enu,
        gyro: sample.gyro,
    }
}

/// Rescale `a_enu` to `cutoff` when its magnitude exceeds it. Keeps one
/// wild sample from slewing the filter.
pub fn clamp_accel(a_enu: &mut [f64; 3], cutoff: f64) {
    let norm = crate::sample::norm3(a_enu);
    if norm > cutoff && norm > 0.0 {
        let k = cutoff / norm;
        a_enu[0] *= k;
        a_enu[1] *= k;
        a_enu[2] *= k;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn si(accel: [f64; 3], euler: [f64; 3]) -> Imu20 {
        Imu20 {
            timestamp_ms: 0,
            accel,
            gyro: [0.0; 3],
            euler,
        }
    }

    #[test]
    fn level_stationary_sample_cancels_gravity() {
        let out = mechanize(&si([0.0, 0.0, GRAVITY], [0.0; 3]));
        assert!(out.accel_norm() < 1e-12);
    }

    #[test]
    fn rolled_sensor_still_cancels_gravity() {
        // +90° roll about x: the gravity reaction lands on body +y.
        let half_pi = std::f64::consts::FRAC_PI_2;
        let out = mechanize(&si([0.0, GRAVITY, 0.0], [half_pi, 0.0, 0.0]));
        assert!(out.accel_norm() < 1e-9, "|a_enu| = {}", out.accel_norm());
    }

    #[test]
    fn gimbal_lock_guard_zeroes_acceleration() {
        let out = mechanize(&si([3.0, 2.0, 15.0], [0.0, 1.52, 0.0]));
        assert_eq!(out.a_enu, [0.0; 3]);
    }

    #[test]
    fn clamp_rescales_preserving_direction() {
        let mut a = [30.0, 0.0, 40.0];
        clamp_accel(&mut a, 5.0);
        assert!((crate::sample::norm3(&a) - 5.0).abs() < 1e-12);
        assert!((a[0] / a[2] - 0.75).abs() < 1e-12);
    }
}
