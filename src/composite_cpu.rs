use crate::{extent::Extent, image::Image};

pub type PremulRgba8 = [u8; 4];

/// Porter-Duff `over` in premultiplied integer math.
pub fn over(dst: PremulRgba8, src: PremulRgba8) -> PremulRgba8 {
    if src[3] == 0 {
        return dst;
    }
    if src[3] == 255 {
        return src;
    }
    let inv = 255u16 - u16::from(src[3]);
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = src[i].saturating_add(mul_div255(u16::from(dst[i]), inv));
    }
    out
}

/// Linear blend of two premultiplied pixels, `t` in 0..=1.
pub fn mix(a: PremulRgba8, b: PremulRgba8, t: f32) -> PremulRgba8 {
    let tt = ((t.clamp(0.0, 1.0) * 255.0).round() as i32).clamp(0, 255) as u16;
    let it = 255u16 - tt;
    let mut out = [0u8; 4];
    for i in 0..4 {
        let av = mul_div255(u16::from(a[i]), it);
        let bv = mul_div255(u16::from(b[i]), tt);
        out[i] = av.saturating_add(bv);
    }
    out
}

/// Composite `src` over `backdrop`; the result covers the union of the two
/// extents, sampling transparently where either image is undefined.
pub fn composite_over(src: &Image, backdrop: &Image) -> anyhow::Result<Image> {
    let extent = src.extent().union(&backdrop.extent());
    per_pixel_union(extent, |x, y| over(backdrop.sample(x, y), src.sample(x, y)))
}

/// Crossfade between two images at `t` (0 = all `a`, 1 = all `b`).
pub fn dissolve(a: &Image, b: &Image, t: f32) -> anyhow::Result<Image> {
    let extent = a.extent().union(&b.extent());
    per_pixel_union(extent, |x, y| mix(a.sample(x, y), b.sample(x, y), t))
}

/// Blend `src` over `backdrop` through `mask`: the mask's alpha picks the
/// source, its complement the backdrop.
pub fn blend_with_mask(src: &Image, backdrop: &Image, mask: &Image) -> anyhow::Result<Image> {
    let extent = src.extent().union(&backdrop.extent());
    per_pixel_union(extent, |x, y| {
        let m = f32::from(mask.sample(x, y)[3]) / 255.0;
        mix(backdrop.sample(x, y), src.sample(x, y), m)
    })
}

fn per_pixel_union(
    extent: Extent,
    f: impl Fn(i64, i64) -> PremulRgba8,
) -> anyhow::Result<Image> {
    let mut data = Vec::with_capacity(extent.pixel_count() * 4);
    for y in extent.y..extent.max_y() {
        for x in extent.x..extent.max_x() {
            data.extend_from_slice(&f(x, y));
        }
    }
    Image::from_rgba8_premul(extent, data).map_err(anyhow::Error::from)
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}
