use crate::{extent::Extent, image::Image};

/// Separable gaussian blur over the working plane.
///
/// The output extent grows by `radius` on every side; pixels beyond the
/// input extent read as transparent, so energy bleeds outward instead of
/// clamping at the image edge.
pub fn gaussian_blur(src: &Image, radius: u32, sigma: f32) -> anyhow::Result<Image> {
    if radius == 0 {
        return Ok(src.clone());
    }
    let kernel = gaussian_kernel_q16(radius, sigma)?;
    blur_with_kernel(src, radius, &kernel)
}

/// Box blur: uniform kernel, same extent semantics as [`gaussian_blur`].
pub fn box_blur(src: &Image, radius: u32) -> anyhow::Result<Image> {
    if radius == 0 {
        return Ok(src.clone());
    }
    let taps = 2 * radius as usize + 1;
    let base = (65536 / taps) as u32;
    let mut kernel = vec![base; taps];
    // Push rounding remainder into the center tap so the kernel sums to one.
    kernel[taps / 2] += 65536 - base * taps as u32;
    blur_with_kernel(src, radius, &kernel)
}

fn blur_with_kernel(src: &Image, radius: u32, kernel: &[u32]) -> anyhow::Result<Image> {
    let extent = src.extent().expanded_by(radius);
    if extent.is_empty() {
        return Ok(src.clone());
    }
    let width = extent.width as usize;
    let height = extent.height as usize;

    let plane = src.read_region(extent);
    let mut tmp = vec![0u8; plane.len()];
    let mut out = vec![0u8; plane.len()];

    horizontal_pass(&plane, &mut tmp, width, height, kernel);
    vertical_pass(&tmp, &mut out, width, height, kernel);

    Image::from_rgba8_premul(extent, out).map_err(anyhow::Error::from)
}

/// Q16 fixed-point gaussian weights summing to exactly 65536.
fn gaussian_kernel_q16(radius: u32, sigma: f32) -> anyhow::Result<Vec<u32>> {
    if !sigma.is_finite() || sigma <= 0.0 {
        anyhow::bail!("blur sigma must be finite and > 0, got {sigma}");
    }

    let r = radius as i32;
    let sigma = f64::from(sigma);
    let denom = 2.0 * sigma * sigma;
    let mut weights_f = Vec::<f64>::with_capacity((2 * r + 1) as usize);
    let mut sum = 0.0f64;
    for i in -r..=r {
        let x = f64::from(i);
        let w = (-x * x / denom).exp();
        weights_f.push(w);
        sum += w;
    }
    if sum <= 0.0 {
        anyhow::bail!("gaussian kernel sum is zero");
    }

    let mut weights = Vec::<u32>::with_capacity(weights_f.len());
    let mut acc: i64 = 0;
    for &wf in &weights_f {
        let q = (((wf / sum) * 65536.0).round() as i64).clamp(0, 65536);
        weights.push(q as u32);
        acc += q;
    }
    let delta = 65536 - acc;
    if delta != 0 {
        let mid = weights.len() / 2;
        let adjusted = (i64::from(weights[mid]) + delta).clamp(0, 65536);
        weights[mid] = adjusted as u32;
    }

    Ok(weights)
}

// Out-of-plane taps contribute nothing: the plane is already padded by the
// radius, so anything beyond it is transparent by construction.

fn horizontal_pass(src: &[u8], dst: &mut [u8], width: usize, height: usize, k: &[u32]) {
    let radius = (k.len() / 2) as i64;
    let w = width as i64;
    for y in 0..height {
        for x in 0..w {
            let mut acc = [0u64; 4];
            for (ki, &kw) in k.iter().enumerate() {
                let sx = x + ki as i64 - radius;
                if sx < 0 || sx >= w {
                    continue;
                }
                let idx = (y * width + sx as usize) * 4;
                for c in 0..4 {
                    acc[c] += u64::from(kw) * u64::from(src[idx + c]);
                }
            }
            let out_idx = (y * width + x as usize) * 4;
            for c in 0..4 {
                dst[out_idx + c] = q16_to_u8(acc[c]);
            }
        }
    }
}

fn vertical_pass(src: &[u8], dst: &mut [u8], width: usize, height: usize, k: &[u32]) {
    let radius = (k.len() / 2) as i64;
    let h = height as i64;
    for y in 0..h {
        for x in 0..width {
            let mut acc = [0u64; 4];
            for (ki, &kw) in k.iter().enumerate() {
                let sy = y + ki as i64 - radius;
                if sy < 0 || sy >= h {
                    continue;
                }
                let idx = (sy as usize * width + x) * 4;
                for c in 0..4 {
                    acc[c] += u64::from(kw) * u64::from(src[idx + c]);
                }
            }
            let out_idx = (y as usize * width + x) * 4;
            for c in 0..4 {
                dst[out_idx + c] = q16_to_u8(acc[c]);
            }
        }
    }
}

fn q16_to_u8(acc: u64) -> u8 {
    ((acc + 32768) >> 16).min(255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radius_0_is_identity() {
        let src = Image::filled(Extent::sized(2, 2), [1, 2, 3, 4]).unwrap();
        let out = gaussian_blur(&src, 0, 1.0).unwrap();
        assert_eq!(out.data(), src.data());
        assert_eq!(out.extent(), src.extent());
    }

    #[test]
    fn output_extent_grows_by_radius() {
        let src = Image::filled(Extent::sized(4, 4), [10, 10, 10, 255]).unwrap();
        let out = gaussian_blur(&src, 3, 1.5).unwrap();
        assert_eq!(out.extent(), Extent::new(-3, -3, 10, 10));
    }

    #[test]
    fn rejects_bad_sigma() {
        let src = Image::filled(Extent::sized(2, 2), [0, 0, 0, 0]).unwrap();
        assert!(gaussian_blur(&src, 2, 0.0).is_err());
        assert!(gaussian_blur(&src, 2, f32::NAN).is_err());
    }

    #[test]
    fn energy_is_approximately_preserved() {
        let mut data = vec![0u8; 5 * 5 * 4];
        let center = (2 * 5 + 2) * 4;
        data[center..center + 4].copy_from_slice(&[255, 255, 255, 255]);
        let src = Image::from_rgba8_premul(Extent::sized(5, 5), data).unwrap();

        let out = gaussian_blur(&src, 2, 1.2).unwrap();
        let sum_a: u32 = out.data().chunks_exact(4).map(|px| u32::from(px[3])).sum();
        assert!((sum_a as i32 - 255).abs() <= 4);
    }

    #[test]
    fn box_blur_of_constant_interior_stays_constant() {
        // Away from the edges every tap sees the same value.
        let src = Image::filled(Extent::sized(9, 9), [100, 100, 100, 255]).unwrap();
        let out = box_blur(&src, 2).unwrap();
        assert_eq!(out.sample(4, 4), [100, 100, 100, 255]);
    }
}
