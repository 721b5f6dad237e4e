#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Traits that define the external-collaborator seams of the tracking system.
//!
//! - `FrameSource` is the wireless link: a blocking `read_frame(timeout)` that
//!   yields one raw IMU frame plus its arrival timestamp in monotonic ms.
//! - `CommandPort` writes 5-byte command frames back to the sensor.
//! - `ParamBlobStore` persists opaque per-user parameter blobs.
//! - `clock` offers a `MonotonicClock` plus a manual clock for deterministic
//!   timing in tests and simulations.
//!
//! Other crates depend only on these traits, so the fusion core stays free of
//! transport and storage concerns.
pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Boxed error type used across all boundary traits.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A raw frame as delivered by the link layer, stamped on arrival.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Monotonic arrival time in milliseconds.
    pub timestamp_ms: u64,
    /// Frame bytes, header included.
    pub bytes: Vec<u8>,
}

/// Source of raw IMU frames (the wireless link).
pub trait FrameSource {
    /// Block up to `timeout` for the next frame.
    fn read_frame(&mut self, timeout: std::time::Duration) -> Result<RawFrame, BoxError>;
}

/// Sink for outbound 5-byte command frames.
pub trait CommandPort {
    fn write_command(&mut self, frame: &[u8; 5]) -> Result<(), BoxError>;
}

/// Persistence backend for opaque parameter blobs keyed by user.
pub trait ParamBlobStore: Send {
    /// Returns `Ok(None)` when no blob exists for `user`.
    fn load(&mut self, user: &str) -> Result<Option<Vec<u8>>, BoxError>;
    fn save(&mut self, user: &str, blob: &[u8]) -> Result<(), BoxError>;
}

// Allow boxed trait objects to be used where a generic bound is expected.
impl<T: ?Sized + FrameSource> FrameSource for Box<T> {
    fn read_frame(&mut self, timeout: std::time::Duration) -> Result<RawFrame, BoxError> {
        (**self).read_frame(timeout)
    }
}

impl<T: ?Sized + CommandPort> CommandPort for Box<T> {
    fn write_command(&mut self, frame: &[u8; 5]) -> Result<(), BoxError> {
        (**self).write_command(frame)
    }
}

impl<T: ?Sized + ParamBlobStore> ParamBlobStore for Box<T> {
    fn load(&mut self, user: &str) -> Result<Option<Vec<u8>>, BoxError> {
        (**self).load(user)
    }
    fn save(&mut self, user: &str, blob: &[u8]) -> Result<(), BoxError> {
        (**self).save(user, blob)
    }
}
