//! Bounded diagnostic time series with throttled fan-out.
//!
//! Every fusion step records into named channels; statistics are computed
//! on demand and subscribers receive at most one frame per 50 ms, with only
//! the channels they asked for.

use crossbeam_channel::{Receiver, Sender, bounded};
use std::collections::HashMap;
use std::collections::VecDeque;

/// Channel names recorded by the fusion loop.
pub mod channel {
    pub const ACCEL_X: &str = "accel_x";
    pub const ACCEL_Y: &str = "accel_y";
    pub const ACCEL_Z: &str = "accel_z";
    pub const ACCEL_MAG: &str = "accel_mag";
    pub const GYRO_X: &str = "gyro_x";
    pub const GYRO_Y: &str = "gyro_y";
    pub const GYRO_Z: &str = "gyro_z";
    pub const GYRO_MAG: &str = "gyro_mag";
    pub const ENU_X: &str = "enu_x";
    pub const ENU_Y: &str = "enu_y";
    pub const ENU_Z: &str = "enu_z";
    pub const ENU_MAG: &str = "enu_mag";
    /// Mean of `enu_z` over the trailing second.
    pub const ENU_Z_MEAN_1S: &str = "enu_z_mean_1s";
    /// Vertical linear acceleration with the estimated bias removed.
    pub const RESIDUAL_UP: &str = "residual_up";
    pub const POS_E: &str = "pos_e";
    pub const POS_N: &str = "pos_n";
    pub const POS_U: &str = "pos_u";
    pub const VEL_E: &str = "vel_e";
    pub const VEL_N: &str = "vel_n";
    pub const VEL_U: &str = "vel_u";
    pub const VEL_MAG: &str = "vel_mag";
    pub const BIAS_E: &str = "bias_e";
    pub const BIAS_N: &str = "bias_n";
    pub const BIAS_U: &str = "bias_u";
    pub const ZUPT_ACTIVE: &str = "zupt_active";
    pub const LOOP_RATE: &str = "loop_rate";
    pub const DT_JITTER: &str = "dt_jitter";
}

/// Minimum spacing between frames pushed to one subscriber.
pub const PUBLISH_INTERVAL_MS: u64 = 50;
/// Default per-channel history depth.
pub const DEFAULT_SERIES_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelStats {
    pub current: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// One throttled update: the newest value of each subscribed channel.
#[derive(Debug, Clone)]
pub struct DiagFrame {
    pub timestamp_ms: u64,
    pub values: Vec<(&'static str, f64)>,
}

struct Subscriber {
    tx: Sender<DiagFrame>,
    channels: Vec<&'static str>,
    last_push_ms: Option<u64>,
}

pub struct Diagnostics {
    depth: usize,
    series: HashMap<&'static str, VecDeque<(u64, f64)>>,
    subscribers: Vec<Subscriber>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::with_depth(DEFAULT_SERIES_DEPTH)
    }
}

impl Diagnostics {
    pub fn with_depth(depth: usize) -> Self {
        Self {
            depth: depth.max(1),
            series: HashMap::new(),
            subscribers: Vec::new(),
        }
    }

    pub fn record(&mut self, name: &'static str, timestamp_ms: u64, value: f64) {
        let depth = self.depth;
        let buf = self
            .series
            .entry(name)
            .or_insert_with(|| VecDeque::with_capacity(depth));
        if buf.len() == depth {
            buf.pop_front();
        }
        buf.push_back((timestamp_ms, value));
    }

    /// On-demand statistics over the retained history of one channel.
    pub fn stats(&self, name: &str) -> Option<ChannelStats> {
        let buf = self.series.get(name)?;
        let (_, current) = *buf.back()?;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for (_, v) in buf {
            min = min.min(*v);
            max = max.max(*v);
            sum += *v;
        }
        Some(ChannelStats {
            current,
            min,
            max,
            mean: sum / buf.len() as f64,
        })
    }

    /// Mean of the channel's entries within the trailing `window_ms`.
    pub fn mean_recent(&self, name: &str, now_ms: u64, window_ms: u64) -> Option<f64> {
        let buf = self.series.get(name)?;
        let cutoff = now_ms.saturating_sub(window_ms);
        let mut sum = 0.0;
        let mut n = 0usize;
        for (ts, v) in buf.iter().rev() {
            if *ts < cutoff {
                break;
            }
            sum += *v;
            n += 1;
        }
        (n > 0).then(|| sum / n as f64)
    }

    /// Subscribe to a set of channels; frames arrive at most every 50 ms.
    pub fn subscribe(&mut self, channels: Vec<&'static str>) -> Receiver<DiagFrame> {
        let (tx, rx) = bounded(8);
        self.subscribers.push(Subscriber {
            tx,
            channels,
            last_push_ms: None,
        });
        rx
    }

    /// Push throttled frames to subscribers; call once per fusion step.
    pub fn publish(&mut self, now_ms: u64) {
        let series = &self.series;
        self.subscribers.retain_mut(|sub| {
            if let Some(last) = sub.last_push_ms
                && now_ms.saturating_sub(last) < PUBLISH_INTERVAL_MS
            {
                return true;
            }
            let values: Vec<(&'static str, f64)> = sub
                .channels
                .iter()
                .filter_map(|name| {
                    series
                        .get(name)
                        .and_then(|buf| buf.back())
                        .map(|(_, v)| (*name, *v))
                })
                .collect();
            if values.is_empty() {
                return true;
            }
            sub.last_push_ms = Some(now_ms);
            match sub.tx.try_send(DiagFrame {
                timestamp_ms: now_ms,
                values,
            }) {
                Ok(()) => true,
                // Full queue: drop the frame, keep the subscriber.
                Err(crossbeam_channel::TrySendError::Full(_)) => true,
                // Receiver gone: forget the subscriber.
                Err(crossbeam_channel::TrySendError::Disconnected(_)) => false,
            }
        });
    }
}
