//! Wavefield - statistical ocean wave simulation core
//!
//! Wind-driven wave spectra are sampled into discrete waves and FFT
//! snapshots, then served as point queries (height, displacement, forces),
//! packed maps and analytic Gerstner waves.

pub mod capabilities;
pub mod error;
pub mod fft;
pub mod gerstner;
pub mod ocean;
pub mod params;
pub mod sampling;
pub mod spectrum;
pub mod tasks;

mod sync;

pub use error::{Result, WaterError};
