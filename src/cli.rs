//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;
use glam::Vec2;
use log::warn;

use wavefield::params::{SpectrumKind, TaskSettings, WaveProfile, WindWavesSettings};
use wavefield::sampling::ComputationsMode;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "wavefield")]
#[command(about = "Headless ocean wave simulation driver", long_about = None)]
pub struct Args {
    /// Spectrum resolution (cells per side, rounded to a power of two)
    #[arg(long, value_name = "CELLS", default_value = "64")]
    pub resolution: usize,

    /// Wind speed 10m above the surface (m/s)
    #[arg(long, value_name = "M/S", default_value = "10")]
    pub wind_speed: f32,

    /// Wind direction, clockwise from +X (degrees)
    #[arg(long, value_name = "DEGREES", default_value = "0")]
    pub wind_direction: f32,

    /// Suppression of waves against the wind (0-1)
    #[arg(long, default_value = "0.5")]
    pub directionality: f32,

    /// Spectrum seed (0 = random)
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Spectrum model: phillips (default), unified
    #[arg(long, value_name = "MODEL", default_value = "phillips")]
    pub spectrum: String,

    /// Fetch for the unified spectrum (meters)
    #[arg(long, value_name = "METERS", default_value = "100000")]
    pub fetch: f32,

    /// Samples per side of the query grid
    #[arg(long, value_name = "COUNT", default_value = "8")]
    pub samples: usize,

    /// Simulated frames
    #[arg(long, default_value = "120")]
    pub frames: usize,

    /// Time per frame (seconds)
    #[arg(long, value_name = "SECONDS", default_value = "0.016666")]
    pub frame_step: f32,

    /// Sampling worker threads
    #[arg(long, default_value = "1")]
    pub workers: usize,

    /// Sample precision in (0, 1]
    #[arg(long, default_value = "1.0")]
    pub precision: f32,

    /// Sample result mode: normal (default), stabilized, force
    #[arg(long, value_name = "MODE", default_value = "normal")]
    pub mode: String,

    /// Write one scale's final height field as a grayscale PNG
    #[arg(long, value_name = "PATH")]
    pub export: Option<PathBuf>,

    /// Scale index (0-3) written by --export
    #[arg(long, value_name = "INDEX", default_value = "0")]
    pub export_scale: usize,
}

impl Args {
    /// Parse spectrum model from command-line arguments
    pub fn parse_spectrum_kind(&self) -> SpectrumKind {
        match self.spectrum.to_lowercase().as_str() {
            "phillips" => SpectrumKind::Phillips,
            "unified" => SpectrumKind::Unified,
            other => {
                warn!("Unknown spectrum '{}', using phillips", other);
                SpectrumKind::Phillips
            }
        }
    }

    /// Parse sample result mode from command-line arguments
    pub fn parse_computations_mode(&self) -> ComputationsMode {
        match self.mode.to_lowercase().as_str() {
            "normal" => ComputationsMode::Normal,
            "stabilized" => ComputationsMode::Stabilized,
            "force" => ComputationsMode::ForceCompletion,
            other => {
                warn!("Unknown computations mode '{}', using normal", other);
                ComputationsMode::Normal
            }
        }
    }

    pub fn wave_profile(&self) -> WaveProfile {
        WaveProfile {
            name: "Command line".to_string(),
            spectrum: self.parse_spectrum_kind(),
            wind_speed_ms: self.wind_speed,
            fetch_m: self.fetch,
            directionality: self.directionality,
            ..WaveProfile::default()
        }
    }

    pub fn wind_waves_settings(&self) -> WindWavesSettings {
        let angle = self.wind_direction.to_radians();
        WindWavesSettings {
            resolution: self.resolution,
            seed: self.seed,
            wind_direction: Vec2::new(angle.cos(), angle.sin()),
            ..WindWavesSettings::default()
        }
    }

    pub fn task_settings(&self) -> TaskSettings {
        TaskSettings {
            sampling_threads: self.workers,
            ..TaskSettings::default()
        }
    }
}
