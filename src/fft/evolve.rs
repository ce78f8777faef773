//! Dispersion step: directional spectrum → timed spectrum planes.

use rustfft::num_complex::Complex32;

use super::TimedSpectrum;
use crate::spectrum::{mirror_index, KMap};

/// Advance `directional` to `time` and write the packed planes into `out`.
///
/// With `s1` the cell and `s2` its mirror at `-k`:
/// `H = s1·e^{-iωt} + conj(s2)·e^{iωt}` is Hermitian and transforms to the
/// real height; `H' = s1·e^{-iωt} - conj(s2)·e^{iωt}` carries the quadrature
/// terms used by the force channels. Nyquist cells are dropped: their mirror
/// is not at `-k`, so the odd channels would pick up an imaginary residue.
pub fn evolve(
    directional: &[Complex32],
    kmap: &KMap,
    gravity: f32,
    time: f32,
    out: &mut TimedSpectrum,
) {
    let n = kmap.resolution();
    let size = n * n;
    debug_assert_eq!(directional.len(), size);
    debug_assert_eq!(out.resolution, n);

    out.time = time;
    let (p0, rest) = out.planes.split_at_mut(size);
    let (p1, rest) = rest.split_at_mut(size);
    let (p2, p3) = rest.split_at_mut(size);
    let i = Complex32::new(0.0, 1.0);
    let zero = Complex32::new(0.0, 0.0);
    let nyquist = n / 2;

    for y in 0..n {
        for x in 0..n {
            let index = y * n + x;
            if x == nyquist || y == nyquist {
                p0[index] = zero;
                p1[index] = zero;
                p2[index] = zero;
                p3[index] = zero;
                continue;
            }

            let kv = kmap.values()[index];
            let s1 = directional[index];
            let s2 = directional[mirror_index(x, y, n)];

            let (s, c) = ((gravity * kv.k).sqrt() * time).sin_cos();
            let forward = Complex32::new(c, -s);
            let backward = Complex32::new(c, s);

            let h = s1 * forward + s2.conj() * backward;
            let h_quad = s1 * forward - s2.conj() * backward;

            // Zero at k = 0 keeps the odd channels Hermitian
            let (nx, nz) = (kv.direction.x, kv.direction.y);
            let (kx, kz) = (nx * kv.k, nz * kv.k);

            // height + i·dispX, dispX = IFFT(-i·n̂x·H)
            p0[index] = h + h * nx;
            // dispZ + i·forceY, forceY = IFFT(-i·H')
            p1[index] = -i * h * nz + h_quad;
            // forceX + i·forceZ
            p2[index] = h_quad * nx + i * h_quad * nz;
            // slopeX + i·slopeZ, slope = IFFT(i·k·H)
            p3[index] = i * h * kx - h * kz;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_height_plane_unpacks_to_hermitian_height() {
        let n = 16;
        let gravity = 9.81;
        let time = 2.5;
        let kmap = KMap::new(n, 40.0);
        let directional: Vec<Complex32> = (0..n * n)
            .map(|i| Complex32::new((i as f32 * 0.37).sin(), (i as f32 * 0.91).cos()))
            .collect();

        let mut timed = TimedSpectrum::new(n, 40.0);
        evolve(&directional, &kmap, gravity, time, &mut timed);

        let p0 = timed.plane(0);
        for y in 0..n {
            for x in 0..n {
                let index = y * n + x;
                if x == n / 2 || y == n / 2 {
                    assert_eq!(timed.plane(0)[index].norm(), 0.0);
                    continue;
                }
                let mirror = mirror_index(x, y, n);
                let kv = kmap.values()[index];

                // Split the packed plane back into P + iQ
                let z = p0[index];
                let z_mirror = p0[mirror];
                let p = (z + z_mirror.conj()) * 0.5;
                let q = (z - z_mirror.conj()) * Complex32::new(0.0, -0.5);

                let (s, c) = ((gravity * kv.k).sqrt() * time).sin_cos();
                let h = directional[index] * Complex32::new(c, -s)
                    + directional[mirror].conj() * Complex32::new(c, s);

                assert!((p - h).norm() < 1e-4, "height plane mismatch at {}", index);
                let expected_q = Complex32::new(0.0, -kv.direction.x) * h;
                assert!((q - expected_q).norm() < 1e-4, "dispX mismatch at {}", index);
            }
        }
    }
}
