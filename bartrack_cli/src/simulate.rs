//! Synthesize a set of reps and push it through the full pipeline.
//!
//! Each simulated rep is a push-press-style single: a shallow 2 cm dip, a
//! drive upward to the requested depth, and an 800 ms lockout hold. The
//! hold completes the rep, the filter re-zeroes at lockout, and the next
//! rep starts from the fresh origin, so the whole set stays inside the
//! tracker's position envelope. Useful as an end-to-end smoke test without
//! hardware.

use crate::report::{emit_rep, emit_state};
use bartrack_core::fusion::FusionLoop;
use bartrack_core::sample::{GRAVITY, ImuSample};
use serde_json::json;

const SAMPLE_PERIOD_MS: u64 = 50;
/// Fixed dip depth preceding the drive (cm).
const DIP_CM: f64 = 2.0;

/// Level-attitude sample producing the given vertical ENU acceleration.
fn level_sample(timestamp_ms: u64, a_enu_up: f64) -> ImuSample {
    ImuSample {
        timestamp_ms,
        accel_g: [0.0, 0.0, (a_enu_up + GRAVITY) / GRAVITY],
        gyro_dps: [0.0; 3],
        euler_deg: [0.0; 3],
    }
}

/// Per-sample vertical accelerations for one rep of the requested range of
/// motion.
fn rep_pulse(depth_cm: f64) -> Vec<f64> {
    // The 4-sample drive triangle travels 0.04·a meters.
    let drive = (depth_cm - DIP_CM) / 100.0 / 0.04;
    let mut pulse = Vec::with_capacity(28);
    pulse.extend(std::iter::repeat_n(-2.0, 2));
    pulse.extend(std::iter::repeat_n(2.0, 2));
    pulse.extend(std::iter::repeat_n(drive, 4));
    pulse.extend(std::iter::repeat_n(-drive, 4));
    pulse.extend(std::iter::repeat_n(0.0, 16));
    pulse
}

pub fn run_simulate(
    fusion: &mut FusionLoop,
    reps: u32,
    depth_cm: f64,
    json_mode: bool,
) -> eyre::Result<()> {
    // Above 60 cm the drive would exceed the tracker's velocity envelope.
    if !(10.0..=60.0).contains(&depth_cm) {
        eyre::bail!("depth must be between 10 and 60 cm, got {depth_cm}");
    }
    let rep_events = fusion.subscribe_reps();

    let mut profile: Vec<f64> = vec![0.0; 12];
    for _ in 0..reps {
        profile.extend(rep_pulse(depth_cm));
    }

    let mut last = None;
    for (k, a) in profile.iter().enumerate() {
        let out = fusion.step(level_sample(k as u64 * SAMPLE_PERIOD_MS, *a));
        for event in rep_events.try_iter() {
            emit_rep(&event, json_mode);
        }
        last = out.or(last);
    }

    if let Some(out) = last {
        emit_state(&out.snapshot, json_mode);
    }
    let counted = fusion.completed_reps();
    if json_mode {
        println!(
            "{}",
            json!({
                "type": "summary",
                "requested_reps": reps,
                "counted_reps": counted,
                "depth_cm": depth_cm,
            })
        );
    } else {
        println!("simulated {reps} reps at {depth_cm} cm depth, counted {counted}");
    }
    if counted != reps {
        tracing::warn!(requested = reps, counted, "simulation under- or over-counted");
    }
    Ok(())
}
