//! Error types for the wave simulation.

use thiserror::Error;

/// Errors surfaced by the wave simulation.
///
/// Configuration problems are not errors: they fall back to the next supported
/// setting (see [`crate::capabilities::FinalSettings`]).
#[derive(Debug, Error)]
pub enum WaterError {
    /// Sample precision outside (0, 1].
    #[error("sample precision must be in (0, 1], got {0}")]
    InvalidPrecision(f32),

    /// A setting no fallback can repair (negative wind speed, zero time step).
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// Transform size is not a power of two in the supported range.
    #[error("resolution {0} is not a power of two in 16..=4096")]
    InvalidResolution(usize),

    /// No GPU adapter could be requested.
    #[error("no GPU adapter available")]
    AdapterUnavailable,

    /// GPU device creation or submission failed.
    #[error("GPU device error: {0}")]
    Device(String),

    /// Mapping a readback buffer failed.
    #[error("GPU buffer map failed: {0}")]
    BufferMap(String),

    /// A worker thread could not be started.
    #[error("failed to spawn worker thread: {0}")]
    ThreadSpawn(String),

    /// A worker loop terminated on an error or panic.
    #[error("worker '{worker}' stopped: {message}")]
    WorkerFault {
        /// Thread name.
        worker: String,
        /// Error or panic message.
        message: String,
    },

    /// Writing an exported map failed.
    #[error("image export failed: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, WaterError>;
