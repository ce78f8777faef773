//! Wavefield - headless driver for the ocean wave simulation
//!
//! Spins up the worker pool and one ocean, keeps a grid of water samples busy
//! for a number of frames and reports what the surface did.

mod cli;

use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use cli::Args;
use wavefield::capabilities::Capabilities;
use wavefield::ocean::{OceanSystem, ResolveMode};
use wavefield::params::QualitySettings;
use wavefield::sampling::DisplacementMode;
use wavefield::spectrum::NUM_SCALES;
use wavefield::tasks::TaskRunner;
use wavefield::Result;

/// Spacing between sample grid points (meters)
const SAMPLE_SPACING_M: f32 = 7.5;

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let capabilities = Capabilities::detect();
    let runner = TaskRunner::start(args.task_settings())?;

    let mut ocean = OceanSystem::init(
        args.wind_waves_settings(),
        &QualitySettings::default(),
        &[(args.wave_profile(), 1.0)],
        &capabilities,
        runner.clone(),
    )?;
    info!(
        "Seed {}, features {:?}",
        ocean.seed(),
        ocean.features()
    );

    let half = args.samples as f32 * SAMPLE_SPACING_M * 0.5;
    let positions: Vec<(f32, f32)> = (0..args.samples * args.samples)
        .map(|i| {
            let x = (i % args.samples) as f32 * SAMPLE_SPACING_M - half;
            let z = (i / args.samples) as f32 * SAMPLE_SPACING_M - half;
            (x, z)
        })
        .collect();

    let samples = positions
        .iter()
        .map(|&(x, z)| {
            let sample = ocean.create_sample(DisplacementMode::HeightAndForces, args.precision)?;
            sample.start(x, z);
            Ok(sample)
        })
        .collect::<Result<Vec<_>>>()?;

    let mode = args.parse_computations_mode();
    let mut min_height = f32::INFINITY;
    let mut max_height = f32::NEG_INFINITY;
    let mut sum_squares = 0.0;
    let mut count = 0usize;

    for frame in 0..args.frames {
        ocean.update(args.frame_step)?;

        for (sample, &(x, z)) in samples.iter().zip(&positions) {
            let result = sample.get_and_reset(x, z, mode);
            let height = result.position.y;
            min_height = min_height.min(height);
            max_height = max_height.max(height);
            sum_squares += height * height;
            count += 1;
        }

        if frame % 60 == 0 {
            let modes: Vec<ResolveMode> = (0..NUM_SCALES)
                .map(|scale| ocean.resolver().level(scale).mode())
                .collect();
            info!("Frame {}: t = {:.2} s, resolve modes {:?}", frame, ocean.time(), modes);
        }
    }

    let stats = ocean.statistics();
    let wave_counts: Vec<usize> = ocean
        .resolver()
        .spectra()
        .iter()
        .map(|data| (0..NUM_SCALES).map(|scale| data.wave_count(scale)).sum())
        .collect();
    info!(
        "Heights over {} queries: min {:.3} m, max {:.3} m, rms {:.3} m",
        count,
        min_height,
        max_height,
        (sum_squares / count.max(1) as f32).sqrt()
    );
    info!(
        "Waves per spectrum {:?}, total amplitude {:.3} m, max vertical displacement {:.3} m",
        wave_counts, stats.total_amplitude, stats.max_vertical_displacement
    );

    if let Some(path) = &args.export {
        match ocean.maps() {
            Some(maps) => {
                maps.export_height_png(args.export_scale.min(NUM_SCALES - 1), path)?;
                info!("Height map written to {}", path.display());
            }
            None => info!("Render mode has no FFT maps, nothing to export"),
        }
    }

    for sample in &samples {
        sample.stop();
    }
    ocean.shutdown();
    runner.shutdown();
    Ok(())
}
