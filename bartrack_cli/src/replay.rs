//! Replay a recorded frame log through the fusion pipeline.
//!
//! The log stands in for the wireless link: it is consumed through the same
//! `FrameSource` seam production uses. Format, per record: `u64`
//! little-endian arrival timestamp (ms), `u8` frame length, then the frame
//! bytes. Truncated tails are ignored with a warning, matching the
//! silent-skip decode policy.

use crate::report::{emit_rep, emit_state};
use bartrack_core::fusion::FusionLoop;
use bartrack_traits::{BoxError, FrameSource, RawFrame};
use eyre::WrapErr;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const RECORD_HEADER_LEN: usize = 9;

/// A recorded frame log, served through the link-side trait.
struct FrameLog {
    bytes: Vec<u8>,
    cursor: usize,
}

impl FrameLog {
    fn open(path: &Path) -> eyre::Result<Self> {
        let bytes =
            std::fs::read(path).wrap_err_with(|| format!("read frame log {}", path.display()))?;
        Ok(Self { bytes, cursor: 0 })
    }
}

impl FrameSource for FrameLog {
    fn read_frame(&mut self, _timeout: Duration) -> Result<RawFrame, BoxError> {
        if self.cursor + RECORD_HEADER_LEN > self.bytes.len() {
            return Err("end of log".into());
        }
        let mut ts_bytes = [0u8; 8];
        ts_bytes.copy_from_slice(&self.bytes[self.cursor..self.cursor + 8]);
        let timestamp_ms = u64::from_le_bytes(ts_bytes);
        let len = usize::from(self.bytes[self.cursor + 8]);
        self.cursor += RECORD_HEADER_LEN;
        if self.cursor + len > self.bytes.len() {
            return Err("truncated trailing record".into());
        }
        let frame = self.bytes[self.cursor..self.cursor + len].to_vec();
        self.cursor += len;
        Ok(RawFrame {
            timestamp_ms,
            bytes: frame,
        })
    }
}

pub fn run_replay(
    fusion: &mut FusionLoop,
    input: &Path,
    every: u32,
    json_mode: bool,
    shutdown: &Arc<AtomicBool>,
) -> eyre::Result<()> {
    let mut log = FrameLog::open(input)?;
    let reps = fusion.subscribe_reps();

    let mut records = 0u64;
    let mut samples = 0u64;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            tracing::info!(records, "replay interrupted");
            break;
        }
        let raw = match log.read_frame(Duration::ZERO) {
            Ok(raw) => raw,
            Err(e) => {
                if e.to_string() != "end of log" {
                    tracing::warn!(error = %e, "frame log ended irregularly");
                }
                break;
            }
        };
        records += 1;

        if let Some(out) = fusion.ingest(&raw.bytes, raw.timestamp_ms) {
            samples += 1;
            if every > 0 && samples.is_multiple_of(u64::from(every)) {
                emit_state(&out.snapshot, json_mode);
            }
        }
        for event in reps.try_iter() {
            emit_rep(&event, json_mode);
        }
    }

    let counters = fusion.counters();
    if json_mode {
        println!(
            "{}",
            json!({
                "type": "summary",
                "records": records,
                "samples": samples,
                "reps": fusion.completed_reps(),
                "timing_anomalies": counters.timing_anomalies,
                "invalid_samples": counters.invalid_samples,
            })
        );
    } else {
        println!(
            "replayed {records} records ({samples} samples): {} reps, {} timing anomalies",
            fusion.completed_reps(),
            counters.timing_anomalies,
        );
    }
    Ok(())
}
