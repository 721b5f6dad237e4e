//! Stdout reporting: JSONL in `--json` mode, compact human lines otherwise.

use bartrack_core::fusion::{StateSnapshot, TrackingStatus};
use bartrack_core::rep::RepEvent;
use serde_json::json;

pub fn status_name(status: TrackingStatus) -> &'static str {
    match status {
        TrackingStatus::Uninitialized => "uninitialized",
        TrackingStatus::Waiting => "waiting",
        TrackingStatus::Initialized => "initialized",
    }
}

pub fn emit_state(snapshot: &StateSnapshot, json_mode: bool) {
    if json_mode {
        println!(
            "{}",
            json!({
                "type": "state",
                "t_ms": snapshot.timestamp_ms,
                "p_m": snapshot.position,
                "v_mps": snapshot.velocity,
                "bias_mps2": snapshot.bias,
                "zupt": snapshot.zupt_active,
                "status": status_name(snapshot.status),
                "loop_hz": snapshot.loop_rate_hz,
                "dt_jitter_s": snapshot.dt_jitter_s,
            })
        );
    } else {
        println!(
            "t={:>7} ms  p_U={:+.3} m  v_U={:+.3} m/s  zupt={}  {}",
            snapshot.timestamp_ms,
            snapshot.position[2],
            snapshot.velocity[2],
            u8::from(snapshot.zupt_active),
            status_name(snapshot.status),
        );
    }
}

pub fn emit_rep(event: &RepEvent, json_mode: bool) {
    if json_mode {
        println!(
            "{}",
            json!({
                "type": "rep",
                "number": event.number,
                "t_ms": event.timestamp_ms,
                "duration_ms": event.duration_ms,
                "rom_cm": event.rom_cm,
                "avg_speed_cms": event.avg_speed_cms,
                "peak_speed_cms": event.peak_speed_cms,
                "balance_percent": event.balance_percent,
            })
        );
    } else {
        println!(
            "rep #{:<3} rom={} cm  avg={} cm/s  peak={} cm/s  balance={}%  ({} ms)",
            event.number,
            event.rom_cm,
            event.avg_speed_cms,
            event.peak_speed_cms,
            event.balance_percent,
            event.duration_ms,
        );
    }
}
