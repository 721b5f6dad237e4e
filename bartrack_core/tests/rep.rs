//! Rep detector scenarios on synthesized position/velocity traces.

use bartrack_config::RepParams;
use bartrack_core::rep::{RepDetector, RepState};
use rstest::rstest;

/// (pos_cm, vel_cms) trace at 20 Hz: 0 → −20 cm → +5 cm → hold.
fn happy_path_trace() -> Vec<(f64, f64)> {
    let mut trace = Vec::new();
    // Descend 20 cm over 1 s.
    for k in 1..=20 {
        trace.push((-(k as f64), -20.0));
    }
    // Ascend 25 cm over 1 s.
    for k in 1..=20 {
        trace.push((-20.0 + 1.25 * k as f64, 25.0));
    }
    // Hold the lockout for half a second.
    for _ in 0..10 {
        trace.push((5.0, 0.0));
    }
    trace
}

fn run_trace(d: &mut RepDetector, trace: &[(f64, f64)], t0: u64) -> Vec<u32> {
    let mut numbers = Vec::new();
    for (k, (pos, vel)) in trace.iter().enumerate() {
        if let Some(event) = d.step(*pos, *vel, 0.0, t0 + k as u64 * 50) {
            numbers.push(event.number);
        }
    }
    numbers
}

#[test]
fn happy_path_emits_exactly_one_rep_with_full_rom() {
    let mut d = RepDetector::new(RepParams::default());
    let rx = d.subscribe();
    let trace = happy_path_trace();
    let mut events = Vec::new();
    for (k, (pos, vel)) in trace.iter().enumerate() {
        events.extend(d.step(*pos, *vel, 2.0, k as u64 * 50));
    }
    assert_eq!(events.len(), 1);
    let rep = events[0];
    assert_eq!(rep.number, 1);
    assert_eq!(rep.rom_cm, 25);
    assert_eq!(rep.peak_speed_cms, 25);
    // Constant 2° tilt error: balance = 100 − 10·2.
    assert_eq!(rep.balance_percent, 80);
    assert!(rep.duration_ms >= 2_000);
    // The event stream saw the same rep.
    assert_eq!(rx.try_iter().count(), 1);
    assert_eq!(d.state(), RepState::Waiting);
}

#[test]
fn rep_numbers_increase_strictly_from_one() {
    let mut d = RepDetector::new(RepParams::default());
    let trace = happy_path_trace();
    let span = trace.len() as u64 * 50;
    let mut numbers = Vec::new();
    for set in 0..3u64 {
        numbers.extend(run_trace(&mut d, &trace, set * span));
    }
    assert_eq!(numbers, vec![1, 2, 3]);
}

#[test]
fn emitted_reps_always_meet_min_rom() {
    // Mixed set: a 10 cm partial (discarded) then a full 25 cm rep.
    let params = RepParams::default();
    let mut d = RepDetector::new(params);
    let mut all = Vec::new();
    let mut feed = |d: &mut RepDetector, trace: &[(f64, f64)], t0: u64| {
        for (k, (pos, vel)) in trace.iter().enumerate() {
            if let Some(e) = d.step(*pos, *vel, 0.0, t0 + k as u64 * 50) {
                all.push(e);
            }
        }
    };

    let mut partial = Vec::new();
    for k in 1..=10 {
        partial.push((-(k as f64), -20.0));
    }
    for k in 1..=10 {
        partial.push((-10.0 + k as f64, 20.0));
    }
    for _ in 0..12 {
        partial.push((0.0, 0.0));
    }
    feed(&mut d, &partial, 0);
    feed(&mut d, &happy_path_trace(), 10_000);

    assert_eq!(all.len(), 1);
    assert!(all.iter().all(|e| f64::from(e.rom_cm) >= params.min_rom_cm));
}

#[test]
fn unstable_lockout_discards_the_rep() {
    let mut d = RepDetector::new(RepParams::default());
    // Full descent and ascent…
    for k in 1..=20 {
        d.step(-(k as f64), -20.0, 0.0, k * 50);
    }
    for k in 1..=20 {
        d.step(-20.0 + 1.25 * k as f64, 25.0, 0.0, 1_000 + k * 50);
    }
    // …stabilize into lockout…
    for k in 0..3u64 {
        d.step(5.0, 0.0, 0.0, 2_050 + k * 50);
    }
    assert_eq!(d.state(), RepState::Lockout);
    // …then wobble upward before the hold completes: discarded.
    assert_eq!(d.step(5.5, 8.0, 0.0, 2_250), None);
    assert_eq!(d.state(), RepState::Waiting);
    assert_eq!(d.completed_reps(), 0);
}

#[rstest]
// Rose 22 cm above the bottom before diving again: the rep survives.
#[case::rom_already_covered(-20.0, 2.2, RepState::Descending)]
// Only 5 cm of travel when the bar dives again: discarded.
#[case::rom_not_reached(-8.0, 0.5, RepState::Waiting)]
fn redescending_from_ascent_keeps_or_drops_the_rep(
    #[case] depth_cm: f64,
    #[case] ascent_step_cm: f64,
    #[case] expected: RepState,
) {
    let mut d = RepDetector::new(RepParams::default());
    for k in 1..=10 {
        d.step(depth_cm * k as f64 / 10.0, -20.0, 0.0, k * 50);
    }
    for k in 1..=10 {
        d.step(depth_cm + ascent_step_cm * k as f64, 20.0, 0.0, 500 + k * 50);
    }
    d.step(depth_cm + ascent_step_cm * 10.0 - 1.0, -20.0, 0.0, 1_050);
    assert_eq!(d.state(), expected);
    assert_eq!(d.completed_reps(), 0);
}
