//! Parameter definitions with physical units and documented semantics.
//!
//! Every tunable constant lives here with:
//! - Physical units (meters, seconds, m/s)
//! - Documented ranges and meanings
//! - A `validate` for values no fallback can repair

mod profile;
mod quality;
mod tasks;
mod waves;

// Re-export all types
pub use profile::{SpectrumKind, WaveProfile};
pub use quality::{QualityLevel, QualitySettings, WavesMode};
pub use tasks::{TaskSettings, ThreadPriority};
pub use waves::{RenderMode, WindWavesSettings, TILE_SIZE_SCALES};
