#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Inertial bar-tracking core (transport- and storage-agnostic).
//!
//! The pipeline turns raw sensor frames into a filtered kinematic state and
//! counted repetitions:
//!
//! - **Codec**: fixed-layout frame decode and command builders (`frames`)
//! - **Mechanization**: body→ENU rotation and gravity removal (`mechanize`)
//! - **Detection**: windowed zero-velocity test (`zupt`, `window`)
//! - **Estimation**: 9-state Kalman filter with motion constraints (`eskf`)
//! - **Orchestration**: the single-threaded sample loop (`fusion`)
//! - **Calibration**: guided threshold learning (`calibration`)
//! - **Reps**: vertical four-state rep counter (`rep`)
//! - **Persistence**: parameter repository over a blob store (`store`)
//! - **Observability**: bounded diagnostic series (`diagnostics`)
//!
//! Transport and storage go through `bartrack_traits`; tunables live in
//! `bartrack_config` and flow in as one `UserParams` bundle.

pub mod calibration;
pub mod diagnostics;
pub mod error;
pub mod eskf;
pub mod frames;
pub mod fusion;
pub mod mechanize;
pub mod rep;
pub mod sample;
pub mod store;
pub mod window;
pub mod zupt;

pub use calibration::{CalibrationPhase, CalibrationResult, CalibrationSequencer};
pub use error::{BuildError, Result, StoreError};
pub use eskf::Eskf;
pub use frames::Frame;
pub use fusion::{FusionLoop, StateSnapshot, StepOutput, TrackingStatus};
pub use rep::{RepDetector, RepEvent, RepState};
pub use sample::{EnuSample, GRAVITY, Imu20, ImuSample};
pub use store::{FileBlobStore, MemoryBlobStore, ParamRepository};
pub use window::SampleWindow;
pub use zupt::ZuptDetector;
