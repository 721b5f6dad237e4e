//! Nine-state error-state Kalman filter over position, velocity, and
//! accelerometer bias in the ENU frame.
//!
//! State layout: `x = [p_E, p_N, p_U, v_E, v_N, v_U, b_E, b_N, b_U]`
//! (meters, m/s, m/s²). The covariance is a flat row-major `[f64; 81]`; all
//! matrix scratch is stack-sized, so a filter step allocates nothing.
//!
//! Measurement updates use the Joseph form
//! `(I − KH)·P·(I − KH)ᵀ + K·R·Kᵀ` and re-symmetrize afterwards.

use bartrack_config::{EkfParams, LateralAxis};

pub const N: usize = 9;
type Mat9 = [f64; N * N];

/// Initial 1-sigma uncertainties: 1 cm position, 1 mm/s velocity, 1 mg bias.
const INIT_POS_STD: f64 = 0.01;
const INIT_VEL_STD: f64 = 0.001;
const INIT_BIAS_STD: f64 = 0.01;

/// Determinant guard for the 3×3 innovation inverse.
const SINGULAR_DET: f64 = 1e-10;

// -- Flat 9×9 helpers --

#[inline]
const fn at(r: usize, c: usize) -> usize {
    r * N + c
}

#[inline]
fn m(mat: &Mat9, r: usize, c: usize) -> f64 {
    mat[at(r, c)]
}

#[inline]
fn mset(mat: &mut Mat9, r: usize, c: usize, v: f64) {
    mat[at(r, c)] = v;
}

#[inline]
fn mat_zero() -> Mat9 {
    [0.0; N * N]
}

fn mat_identity() -> Mat9 {
    let mut out = mat_zero();
    for i in 0..N {
        out[at(i, i)] = 1.0;
    }
    out
}

/// C = A · B
fn mat_mul(a: &Mat9, b: &Mat9) -> Mat9 {
    let mut c = mat_zero();
    for i in 0..N {
        for j in 0..N {
            let mut s = 0.0;
            for k in 0..N {
                s += m(a, i, k) * m(b, k, j);
            }
            mset(&mut c, i, j, s);
        }
    }
    c
}

/// C = A · Bᵀ
fn mat_mul_t(a: &Mat9, b: &Mat9) -> Mat9 {
    let mut c = mat_zero();
    for i in 0..N {
        for j in 0..N {
            let mut s = 0.0;
            for k in 0..N {
                s += m(a, i, k) * m(b, j, k);
            }
            mset(&mut c, i, j, s);
        }
    }
    c
}

const MAT3_IDENTITY: [f64; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

/// Analytic 3×3 inverse; `None` when the determinant is within the guard.
fn mat3_invert(a: &[f64; 9]) -> Option<[f64; 9]> {
    let det = a[0] * (a[4] * a[8] - a[5] * a[7]) - a[1] * (a[3] * a[8] - a[5] * a[6])
        + a[2] * (a[3] * a[7] - a[4] * a[6]);
    if det.abs() < SINGULAR_DET {
        return None;
    }
    let inv = det.recip();
    Some([
        (a[4] * a[8] - a[5] * a[7]) * inv,
        -(a[1] * a[8] - a[2] * a[7]) * inv,
        (a[1] * a[5] - a[2] * a[4]) * inv,
        -(a[3] * a[8] - a[5] * a[6]) * inv,
        (a[0] * a[8] - a[2] * a[6]) * inv,
        -(a[0] * a[5] - a[2] * a[3]) * inv,
        (a[3] * a[7] - a[4] * a[6]) * inv,
        -(a[0] * a[7] - a[1] * a[6]) * inv,
        (a[0] * a[4] - a[1] * a[3]) * inv,
    ])
}

pub struct Eskf {
    x: [f64; N],
    p: Mat9,
    params: EkfParams,
}

impl core::fmt::Debug for Eskf {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Eskf")
            .field("position", &self.position())
            .field("velocity", &self.velocity())
            .field("bias", &self.bias())
            .finish()
    }
}

impl Eskf {
    pub fn new(params: EkfParams) -> Self {
        let mut filter = Self {
            x: [0.0; N],
            p: mat_zero(),
            params,
        };
        filter.reset();
        filter
    }

    /// Back to the origin with the conservative initial covariance.
    pub fn reset(&mut self) {
        self.x = [0.0; N];
        self.p = mat_zero();
        for i in 0..3 {
            mset(&mut self.p, i, i, INIT_POS_STD * INIT_POS_STD);
            mset(&mut self.p, 3 + i, 3 + i, INIT_VEL_STD * INIT_VEL_STD);
            mset(&mut self.p, 6 + i, 6 + i, INIT_BIAS_STD * INIT_BIAS_STD);
        }
    }

    pub fn set_params(&mut self, params: EkfParams) {
        self.params = params;
    }

    pub fn params(&self) -> &EkfParams {
        &self.params
    }

    pub fn position(&self) -> [f64; 3] {
        [self.x[0], self.x[1], self.x[2]]
    }

    pub fn velocity(&self) -> [f64; 3] {
        [self.x[3], self.x[4], self.x[5]]
    }

    pub fn bias(&self) -> [f64; 3] {
        [self.x[6], self.x[7], self.x[8]]
    }

    pub fn speed(&self) -> f64 {
        crate::sample::norm3(&self.velocity())
    }

    pub fn covariance(&self) -> &[f64; N * N] {
        &self.p
    }

    pub fn covariance_diag(&self) -> [f64; N] {
        let mut d = [0.0; N];
        for i in 0..N {
            d[i] = m(&self.p, i, i);
        }
        d
    }

    pub fn set_position_component(&mut self, i: usize, v: f64) {
        debug_assert!(i < 3);
        self.x[i] = v;
    }

    pub fn set_velocity(&mut self, v: [f64; 3]) {
        self.x[3..6].copy_from_slice(&v);
    }

    pub fn set_velocity_component(&mut self, i: usize, v: f64) {
        debug_assert!(i < 3);
        self.x[3 + i] = v;
    }

    /// Propagate by `dt` seconds with the measured ENU acceleration.
    ///
    /// The transition couples position to bias through the −½dt² block; the
    /// discrete process noise is the white-acceleration fill over each
    /// (p, v) axis pair plus the bias random walk.
    pub fn predict(&mut self, dt: f64, a_enu: [f64; 3]) {
        let dt2 = dt * dt;

        // Bias-corrected nominal integration.
        let a = [
            a_enu[0] - self.x[6],
            a_enu[1] - self.x[7],
            a_enu[2] - self.x[8],
        ];
        for i in 0..3 {
            self.x[i] += self.x[3 + i] * dt + 0.5 * a[i] * dt2;
            self.x[3 + i] += a[i] * dt;
        }

        // Φ = I + F·dt
        let mut phi = mat_identity();
        for i in 0..3 {
            mset(&mut phi, i, 3 + i, dt);
            mset(&mut phi, 3 + i, 6 + i, -dt);
            mset(&mut phi, i, 6 + i, -0.5 * dt2);
        }

        // P = Φ P Φᵀ + Q
        let phip = mat_mul(&phi, &self.p);
        let mut p_new = mat_mul_t(&phip, &phi);
        let q_pp = self.params.qv * dt2 * dt2 / 4.0;
        let q_pv = self.params.qv * dt * dt2 / 2.0;
        let q_vv = self.params.qv * dt2;
        let q_bb = self.params.qba * dt;
        for i in 0..3 {
            p_new[at(i, i)] += q_pp;
            p_new[at(i, 3 + i)] += q_pv;
            p_new[at(3 + i, i)] += q_pv;
            p_new[at(3 + i, 3 + i)] += q_vv;
            p_new[at(6 + i, 6 + i)] += q_bb;
        }
        self.p = p_new;
    }

    /// Zero-velocity pseudo-measurement: `H = [0 I 0]`, innovation `−v`.
    ///
    /// When the innovation covariance is near-singular its inverse is
    /// replaced by identity; with the tiny covariances that trigger the
    /// guard, the resulting gain makes the update an effective no-op rather
    /// than a NaN source.
    pub fn zupt_update(&mut self) {
        let rv = self.params.rv;
        let mut s = [0.0; 9];
        for r in 0..3 {
            for c in 0..3 {
                s[r * 3 + c] = m(&self.p, 3 + r, 3 + c) + if r == c { rv } else { 0.0 };
            }
        }
        let s_inv = mat3_invert(&s).unwrap_or(MAT3_IDENTITY);

        // K = P Hᵀ S⁻¹ (9×3); P Hᵀ is the velocity column block of P.
        let mut k = [0.0; N * 3];
        for r in 0..N {
            for c in 0..3 {
                let mut v = 0.0;
                for j in 0..3 {
                    v += m(&self.p, r, 3 + j) * s_inv[j * 3 + c];
                }
                k[r * 3 + c] = v;
            }
        }

        let y = [-self.x[3], -self.x[4], -self.x[5]];
        for r in 0..N {
            self.x[r] += k[r * 3] * y[0] + k[r * 3 + 1] * y[1] + k[r * 3 + 2] * y[2];
        }

        self.joseph3(&k, 3, rv);
        self.symmetrize();
    }

    /// Pin one lateral position axis to the zero plane.
    pub fn planar_update(&mut self, axis: LateralAxis) {
        let i = match axis {
            LateralAxis::X => 0,
            LateralAxis::Y => 1,
        };
        self.scalar_position_update(i, 0.0, self.params.ry);
    }

    /// Pull the horizontal position toward the learned anchor, one scalar
    /// Joseph update per axis.
    pub fn line_vertical_update(&mut self, anchor_e: f64, anchor_n: f64) {
        self.scalar_position_update(0, anchor_e, self.params.ry);
        self.scalar_position_update(1, anchor_n, self.params.ry);
    }

    /// Post-ZUPT velocity floor: horizontal velocity cleared, a small
    /// upward residual kept so the rep detector's descent trigger is never
    /// starved, and the velocity sub-covariance reset to `Rv·I` while the
    /// position cross-terms stay intact.
    pub fn apply_velocity_floor(&mut self, residual_up: f64) {
        self.x[3] = 0.0;
        self.x[4] = 0.0;
        self.x[5] = residual_up;
        let rv = self.params.rv;
        for r in 3..6 {
            for c in 3..6 {
                mset(&mut self.p, r, c, if r == c { rv } else { 0.0 });
            }
        }
    }

    fn scalar_position_update(&mut self, axis: usize, target: f64, r_noise: f64) {
        let s = m(&self.p, axis, axis) + r_noise;
        if s.abs() < 1e-12 {
            return;
        }
        let inv_s = s.recip();
        let mut k = [0.0; N];
        for r in 0..N {
            k[r] = m(&self.p, r, axis) * inv_s;
        }
        let y = target - self.x[axis];
        for r in 0..N {
            self.x[r] += k[r] * y;
        }

        // Joseph form with the rank-one H = e_axis.
        let mut a = mat_identity();
        for r in 0..N {
            a[at(r, axis)] -= k[r];
        }
        let ap = mat_mul(&a, &self.p);
        let mut p_new = mat_mul_t(&ap, &a);
        for r in 0..N {
            for c in 0..N {
                p_new[at(r, c)] += k[r] * r_noise * k[c];
            }
        }
        self.p = p_new;
        self.symmetrize();
    }

    /// P = (I − KH)·P·(I − KH)ᵀ + K·R·Kᵀ for a 3-wide block H starting at
    /// `h_offset`, with R = r·I.
    fn joseph3(&mut self, k: &[f64; N * 3], h_offset: usize, r_noise: f64) {
        let mut a = mat_identity();
        for r in 0..N {
            for c in 0..3 {
                a[at(r, h_offset + c)] -= k[r * 3 + c];
            }
        }
        let ap = mat_mul(&a, &self.p);
        let mut p_new = mat_mul_t(&ap, &a);
        for r in 0..N {
            for c in 0..N {
                let mut v = 0.0;
                for j in 0..3 {
                    v += k[r * 3 + j] * k[c * 3 + j];
                }
                p_new[at(r, c)] += r_noise * v;
            }
        }
        self.p = p_new;
    }

    fn symmetrize(&mut self) {
        for r in 0..N {
            for c in (r + 1)..N {
                let avg = 0.5 * (m(&self.p, r, c) + m(&self.p, c, r));
                mset(&mut self.p, r, c, avg);
                mset(&mut self.p, c, r, avg);
            }
        }
    }

    /// Largest |P[r,c] − P[c,r]|; diagnostics only.
    pub fn asymmetry(&self) -> f64 {
        let mut worst: f64 = 0.0;
        for r in 0..N {
            for c in (r + 1)..N {
                worst = worst.max((m(&self.p, r, c) - m(&self.p, c, r)).abs());
            }
        }
        worst
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mat3_inverse_recovers_identity() {
        let a = [2.0, 0.0, 1.0, 0.0, 3.0, 0.0, 1.0, 0.0, 2.0];
        let inv = mat3_invert(&a).unwrap();
        for r in 0..3 {
            for c in 0..3 {
                let mut s = 0.0;
                for k in 0..3 {
                    s += a[r * 3 + k] * inv[k * 3 + c];
                }
                let expect = if r == c { 1.0 } else { 0.0 };
                assert!((s - expect).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn near_singular_matrix_is_refused() {
        let a = [1e-5, 0.0, 0.0, 0.0, 1e-5, 0.0, 0.0, 0.0, 1e-5];
        assert!(mat3_invert(&a).is_none());
    }

    #[test]
    fn predict_integrates_constant_acceleration() {
        let mut f = Eskf::new(EkfParams::default());
        for _ in 0..20 {
            f.predict(0.05, [0.0, 0.0, 1.0]);
        }
        let v = f.velocity();
        let p = f.position();
        assert!((v[2] - 1.0).abs() < 1e-9);
        // Discrete sum with the ½dt² term matches the continuous ½at².
        assert!((p[2] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn phi_couples_position_to_bias() {
        // A pure bias (no measured accel) must pull position covariance
        // through the −½dt² block: after predict, cov(p, b) < 0.
        let mut f = Eskf::new(EkfParams::default());
        f.predict(0.1, [0.0; 3]);
        assert!(m(f.covariance(), 0, 6) < 0.0);
    }

    #[test]
    fn planar_update_shrinks_the_observed_axis_only_toward_zero() {
        let mut f = Eskf::new(EkfParams::default());
        for _ in 0..40 {
            f.predict(0.05, [0.3, 0.0, 0.0]);
        }
        let before = f.position();
        assert!(before[0] > 0.1);
        f.planar_update(LateralAxis::X);
        let after = f.position();
        assert!(after[0].abs() < before[0].abs());
        assert!((after[2] - before[2]).abs() < 1e-12);
    }
}
