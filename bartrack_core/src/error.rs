//! Build and persistence errors for the tracking core.
//!
//! The per-sample hot path never returns errors; it degrades to no-op or
//! clamp instead. Typed errors exist at construction time and at the
//! storage boundary, where persistence failures are logged (never fatal)
//! with a stable shape.
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

/// Failures at the parameter-store boundary. These never abort the fusion
/// loop; the repository logs them and keeps serving its in-memory snapshot.
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("params load failed for '{user}': {detail}")]
    Load { user: String, detail: String },
    #[error("params blob for '{user}' rejected: {detail}")]
    Decode { user: String, detail: String },
    #[error("params serialize failed for '{user}': {detail}")]
    Encode { user: String, detail: String },
    #[error("params persist failed for '{user}': {detail}")]
    Persist { user: String, detail: String },
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
