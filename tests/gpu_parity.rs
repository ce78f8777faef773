//! GPU and CPU transforms must agree. Needs a compute-capable adapter.

use glam::Vec2;
use rustfft::num_complex::Complex32;
use wavefield::fft::{CpuSpectrumTransform, GpuSpectrumTransform, SpectrumTransform, TimedSpectrum, PLANES};

fn test_spectrum(n: usize) -> TimedSpectrum {
    let mut spectrum = TimedSpectrum::new(n, 64.0);
    for (i, value) in spectrum.planes.iter_mut().enumerate() {
        *value = Complex32::new((i as f32 * 0.41).sin(), (i as f32 * 0.17).cos()) * 0.1;
    }
    spectrum
}

#[test]
#[ignore = "requires a GPU adapter"]
fn test_gpu_matches_cpu() {
    let mut gpu = GpuSpectrumTransform::new().expect("GPU transform");
    let mut cpu = CpuSpectrumTransform::new();

    for n in [16, 64] {
        let spectrum = test_spectrum(n);
        assert_eq!(spectrum.planes.len(), PLANES * n * n);
        let expected = cpu.transform(&spectrum).unwrap();
        let actual = gpu.transform(&spectrum).unwrap();

        for i in 0..n * n {
            assert!((expected.force_and_height[i] - actual.force_and_height[i]).length() < 1e-3);
            assert!((expected.displacement[i] - actual.displacement[i]).length() < 1e-3);
            assert!((expected.slope[i] - actual.slope[i]).length() < 1e-3);
        }

        let p = Vec2::new(3.3, 17.0);
        assert!((expected.sample(p).height - actual.sample(p).height).abs() < 1e-3);
    }
}
