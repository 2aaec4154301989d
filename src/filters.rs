//! The builtin filter table.
//!
//! Filter kinds are data: one [`FilterSpec`] per entry, paired with an
//! implementation pack chosen by [`BackendKind`] when the registry is built.
//! Compositing and geometry delegate to the `*_cpu` kernel modules; the
//! point operations live here.

use anyhow::{Context as _, anyhow};

use crate::{
    blur_cpu, composite_cpu,
    error::FiltraResult,
    extent::Extent,
    image::Image,
    params::ParameterSet,
    registry::{BackendKind, FilterRegistry},
    spec::FilterSpec,
    transform_cpu,
    value::{ParameterValue, ValueTag},
};

/// Register every builtin filter against `registry`.
///
/// Specs are identical across backend kinds; only the implementations vary.
pub fn register_builtin(registry: &mut FilterRegistry, kind: BackendKind) -> FiltraResult<()> {
    match kind {
        BackendKind::Cpu => register_cpu(registry),
    }
}

fn register_cpu(reg: &mut FilterRegistry) -> FiltraResult<()> {
    reg.register(
        FilterSpec::unary("gaussian_blur")
            .required("radius", ValueTag::Scalar)
            .optional("sigma", ValueTag::Scalar, None),
        cpu_gaussian_blur,
    )?;
    reg.register(
        FilterSpec::unary("box_blur").required("radius", ValueTag::Scalar),
        cpu_box_blur,
    )?;
    reg.register(
        FilterSpec::unary("sharpen")
            .required("radius", ValueTag::Scalar)
            .optional("amount", ValueTag::Scalar, Some(ParameterValue::Scalar(1.0))),
        cpu_sharpen,
    )?;
    reg.register(FilterSpec::unary("grayscale"), cpu_grayscale)?;
    reg.register(FilterSpec::unary("invert"), cpu_invert)?;
    reg.register(
        FilterSpec::unary("brightness").required("amount", ValueTag::Scalar),
        cpu_brightness,
    )?;
    reg.register(
        FilterSpec::unary("contrast").required("amount", ValueTag::Scalar),
        cpu_contrast,
    )?;
    reg.register(
        FilterSpec::unary("exposure").required("ev", ValueTag::Scalar),
        cpu_exposure,
    )?;
    reg.register(
        FilterSpec::unary("opacity").required("amount", ValueTag::Scalar),
        cpu_opacity,
    )?;
    reg.register(
        FilterSpec::unary("color_matrix").required("matrix", ValueTag::Vector),
        cpu_color_matrix,
    )?;
    reg.register(
        FilterSpec::unary("affine_transform").required("matrix", ValueTag::Matrix),
        cpu_affine_transform,
    )?;
    reg.register(
        FilterSpec::unary("crop").required("rect", ValueTag::Vector),
        cpu_crop,
    )?;
    reg.register(
        FilterSpec::unary("composite_over").image_input("backdrop"),
        cpu_composite_over,
    )?;
    reg.register(
        FilterSpec::unary("dissolve")
            .image_input("image2")
            .required("t", ValueTag::Scalar),
        cpu_dissolve,
    )?;
    reg.register(
        FilterSpec::unary("blend_with_mask")
            .image_input("backdrop")
            .image_input("mask"),
        cpu_blend_with_mask,
    )?;
    reg.register(
        FilterSpec::new("constant_color")
            .required("color", ValueTag::Color)
            .required("extent", ValueTag::Vector),
        cpu_constant_color,
    )?;
    Ok(())
}

const MAX_BLUR_RADIUS: u32 = 256;

fn input<'a>(inputs: &'a [Image], index: usize, name: &str) -> anyhow::Result<&'a Image> {
    inputs
        .get(index)
        .with_context(|| format!("missing image input '{name}'"))
}

fn scalar(params: &ParameterSet, name: &str) -> anyhow::Result<f64> {
    params
        .scalar(name)
        .with_context(|| format!("missing scalar parameter '{name}'"))
}

fn radius_px(params: &ParameterSet) -> anyhow::Result<u32> {
    let raw = scalar(params, "radius")?;
    if !raw.is_finite() || raw < 0.0 {
        anyhow::bail!("radius must be finite and >= 0, got {raw}");
    }
    let radius = raw.round() as u32;
    if radius > MAX_BLUR_RADIUS {
        anyhow::bail!("radius must be <= {MAX_BLUR_RADIUS}, got {radius}");
    }
    Ok(radius)
}

fn rect_param(params: &ParameterSet, name: &str) -> anyhow::Result<Extent> {
    let v = params
        .vector(name)
        .with_context(|| format!("missing vector parameter '{name}'"))?;
    let [x, y, w, h] = v else {
        anyhow::bail!("'{name}' must be [x, y, width, height], got {} element(s)", v.len());
    };
    if !(x.is_finite() && y.is_finite() && w.is_finite() && h.is_finite()) {
        anyhow::bail!("'{name}' components must be finite");
    }
    if *w < 0.0 || *h < 0.0 {
        anyhow::bail!("'{name}' size must be non-negative");
    }
    Ok(Extent::new(
        x.round() as i64,
        y.round() as i64,
        w.round() as u32,
        h.round() as u32,
    ))
}

// Point-op plumbing. Color math happens on straight (unpremultiplied)
// values; alpha-linear ops skip the round trip.

fn map_pixels(src: &Image, f: impl Fn([u8; 4]) -> [u8; 4]) -> anyhow::Result<Image> {
    let mut data = Vec::with_capacity(src.data().len());
    for px in src.data().chunks_exact(4) {
        data.extend_from_slice(&f([px[0], px[1], px[2], px[3]]));
    }
    Ok(Image::from_rgba8_premul(src.extent(), data)?)
}

fn map_straight_rgb(src: &Image, f: impl Fn(f32) -> f32) -> anyhow::Result<Image> {
    map_pixels(src, |px| {
        let a = px[3];
        if a == 0 {
            return [0, 0, 0, 0];
        }
        let af = f32::from(a) / 255.0;
        let mut out = [0u8; 4];
        out[3] = a;
        for c in 0..3 {
            let straight = f32::from(px[c]) / 255.0 / af;
            let mapped = f(straight).clamp(0.0, 1.0);
            out[c] = (mapped * af * 255.0).round() as u8;
        }
        out
    })
}

fn cpu_gaussian_blur(inputs: &[Image], params: &ParameterSet) -> anyhow::Result<Image> {
    let src = input(inputs, 0, "image")?;
    let radius = radius_px(params)?;
    let sigma = match params.scalar("sigma") {
        Some(s) => s as f32,
        None => radius as f32 / 2.0,
    };
    blur_cpu::gaussian_blur(src, radius, sigma)
}

fn cpu_box_blur(inputs: &[Image], params: &ParameterSet) -> anyhow::Result<Image> {
    let src = input(inputs, 0, "image")?;
    blur_cpu::box_blur(src, radius_px(params)?)
}

fn cpu_sharpen(inputs: &[Image], params: &ParameterSet) -> anyhow::Result<Image> {
    let src = input(inputs, 0, "image")?;
    let radius = radius_px(params)?;
    let amount = scalar(params, "amount")?;
    if !amount.is_finite() || amount < 0.0 {
        anyhow::bail!("sharpen amount must be finite and >= 0, got {amount}");
    }
    if radius == 0 || amount == 0.0 {
        return Ok(src.clone());
    }

    // Unsharp mask: src + amount * (src - blurred), evaluated on the source
    // extent so sharpening never grows the image.
    let blurred = blur_cpu::gaussian_blur(src, radius, radius as f32 / 2.0)?;
    let extent = src.extent();
    let mut data = Vec::with_capacity(extent.pixel_count() * 4);
    for y in extent.y..extent.max_y() {
        for x in extent.x..extent.max_x() {
            let s = src.sample(x, y);
            let b = blurred.sample(x, y);
            let mut px = [0u8; 4];
            for c in 0..4 {
                let v = f64::from(s[c]) + amount * (f64::from(s[c]) - f64::from(b[c]));
                px[c] = v.round().clamp(0.0, 255.0) as u8;
            }
            // Premultiplied invariant: color cannot exceed alpha.
            for c in 0..3 {
                px[c] = px[c].min(px[3]);
            }
            data.extend_from_slice(&px);
        }
    }
    Ok(Image::from_rgba8_premul(extent, data)?)
}

fn cpu_grayscale(inputs: &[Image], _params: &ParameterSet) -> anyhow::Result<Image> {
    let src = input(inputs, 0, "image")?;
    // Rec. 709 luma; linear in the components, so premultiplication commutes.
    map_pixels(src, |px| {
        let y = (0.2126 * f64::from(px[0]) + 0.7152 * f64::from(px[1]) + 0.0722 * f64::from(px[2]))
            .round()
            .clamp(0.0, 255.0) as u8;
        [y.min(px[3]), y.min(px[3]), y.min(px[3]), px[3]]
    })
}

fn cpu_invert(inputs: &[Image], _params: &ParameterSet) -> anyhow::Result<Image> {
    let src = input(inputs, 0, "image")?;
    map_straight_rgb(src, |c| 1.0 - c)
}

fn cpu_brightness(inputs: &[Image], params: &ParameterSet) -> anyhow::Result<Image> {
    let src = input(inputs, 0, "image")?;
    let amount = scalar(params, "amount")? as f32;
    map_straight_rgb(src, move |c| c + amount)
}

fn cpu_contrast(inputs: &[Image], params: &ParameterSet) -> anyhow::Result<Image> {
    let src = input(inputs, 0, "image")?;
    let amount = scalar(params, "amount")? as f32;
    map_straight_rgb(src, move |c| (c - 0.5) * amount + 0.5)
}

fn cpu_exposure(inputs: &[Image], params: &ParameterSet) -> anyhow::Result<Image> {
    let src = input(inputs, 0, "image")?;
    let ev = scalar(params, "ev")? as f32;
    let gain = ev.exp2();
    map_straight_rgb(src, move |c| c * gain)
}

fn cpu_opacity(inputs: &[Image], params: &ParameterSet) -> anyhow::Result<Image> {
    let src = input(inputs, 0, "image")?;
    let amount = scalar(params, "amount")?;
    let amount = amount.clamp(0.0, 1.0);
    // Premultiplied: scaling every channel scales coverage uniformly.
    map_pixels(src, |px| {
        let mut out = [0u8; 4];
        for c in 0..4 {
            out[c] = (f64::from(px[c]) * amount).round() as u8;
        }
        out
    })
}

fn cpu_color_matrix(inputs: &[Image], params: &ParameterSet) -> anyhow::Result<Image> {
    let src = input(inputs, 0, "image")?;
    let m = params
        .vector("matrix")
        .ok_or_else(|| anyhow!("missing vector parameter 'matrix'"))?;
    if m.len() != 20 {
        anyhow::bail!("color matrix must have 20 entries (4x5 row-major), got {}", m.len());
    }
    let m: Vec<f32> = m.iter().map(|&v| v as f32).collect();

    map_pixels(src, move |px| {
        let a = px[3];
        if a == 0 {
            return [0, 0, 0, 0];
        }
        let af = f32::from(a) / 255.0;
        let straight = [
            f32::from(px[0]) / 255.0 / af,
            f32::from(px[1]) / 255.0 / af,
            f32::from(px[2]) / 255.0 / af,
            af,
        ];
        let mut mapped = [0f32; 4];
        for (row, out) in mapped.iter_mut().enumerate() {
            let base = row * 5;
            *out = (m[base] * straight[0]
                + m[base + 1] * straight[1]
                + m[base + 2] * straight[2]
                + m[base + 3] * straight[3]
                + m[base + 4])
                .clamp(0.0, 1.0);
        }
        let new_a = mapped[3];
        [
            (mapped[0] * new_a * 255.0).round() as u8,
            (mapped[1] * new_a * 255.0).round() as u8,
            (mapped[2] * new_a * 255.0).round() as u8,
            (new_a * 255.0).round() as u8,
        ]
    })
}

fn cpu_affine_transform(inputs: &[Image], params: &ParameterSet) -> anyhow::Result<Image> {
    let src = input(inputs, 0, "image")?;
    let matrix = params
        .matrix("matrix")
        .ok_or_else(|| anyhow!("missing matrix parameter 'matrix'"))?;
    transform_cpu::affine_transform(src, matrix)
}

fn cpu_crop(inputs: &[Image], params: &ParameterSet) -> anyhow::Result<Image> {
    let src = input(inputs, 0, "image")?;
    transform_cpu::crop(src, rect_param(params, "rect")?)
}

fn cpu_composite_over(inputs: &[Image], _params: &ParameterSet) -> anyhow::Result<Image> {
    let src = input(inputs, 0, "image")?;
    let backdrop = input(inputs, 1, "backdrop")?;
    composite_cpu::composite_over(src, backdrop)
}

fn cpu_dissolve(inputs: &[Image], params: &ParameterSet) -> anyhow::Result<Image> {
    let a = input(inputs, 0, "image")?;
    let b = input(inputs, 1, "image2")?;
    let t = scalar(params, "t")?;
    if !t.is_finite() {
        anyhow::bail!("dissolve t must be finite");
    }
    composite_cpu::dissolve(a, b, t as f32)
}

fn cpu_blend_with_mask(inputs: &[Image], _params: &ParameterSet) -> anyhow::Result<Image> {
    let src = input(inputs, 0, "image")?;
    let backdrop = input(inputs, 1, "backdrop")?;
    let mask = input(inputs, 2, "mask")?;
    composite_cpu::blend_with_mask(src, backdrop, mask)
}

fn cpu_constant_color(_inputs: &[Image], params: &ParameterSet) -> anyhow::Result<Image> {
    let color = params
        .color("color")
        .ok_or_else(|| anyhow!("missing color parameter 'color'"))?;
    let extent = rect_param(params, "extent")?;

    let [r, g, b, a] = color.rgba;
    if !(r.is_finite() && g.is_finite() && b.is_finite() && a.is_finite()) {
        anyhow::bail!("color components must be finite");
    }
    let a = a.clamp(0.0, 1.0);
    let px = [
        ((r.clamp(0.0, 1.0) * a) * 255.0).round() as u8,
        ((g.clamp(0.0, 1.0) * a) * 255.0).round() as u8,
        ((b.clamp(0.0, 1.0) * a) * 255.0).round() as u8,
        (a * 255.0).round() as u8,
    ];
    Ok(Image::filled(extent, px)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{params::Params, value::ColorValue};

    fn reg() -> FilterRegistry {
        FilterRegistry::with_builtin(BackendKind::Cpu).unwrap()
    }

    fn set(reg: &FilterRegistry, filter: &str, params: Params) -> ParameterSet {
        ParameterSet::build(reg.spec(filter).unwrap(), params).unwrap()
    }

    #[test]
    fn every_builtin_is_registered_once() {
        let binding = reg();
        let names: Vec<&str> = binding.names().collect();
        assert_eq!(names.len(), 16);
        assert!(names.contains(&"gaussian_blur"));
        assert!(names.contains(&"constant_color"));
        // BTreeMap keys: sorted and necessarily unique.
        assert!(names.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn grayscale_flattens_channels() {
        let r = reg();
        let src = Image::filled(Extent::sized(1, 1), [255, 0, 0, 255]).unwrap();
        let out = r
            .execute("grayscale", &[src], &set(&r, "grayscale", Params::new()))
            .unwrap();
        let px = out.sample(0, 0);
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
        assert_eq!(px[3], 255);
    }

    #[test]
    fn invert_on_opaque_pixels() {
        let r = reg();
        let src = Image::filled(Extent::sized(1, 1), [255, 0, 0, 255]).unwrap();
        let out = r
            .execute("invert", &[src], &set(&r, "invert", Params::new()))
            .unwrap();
        assert_eq!(out.sample(0, 0), [0, 255, 255, 255]);
    }

    #[test]
    fn opacity_scales_premultiplied_channels() {
        let r = reg();
        let src = Image::filled(Extent::sized(1, 1), [200, 100, 50, 255]).unwrap();
        let params = set(&r, "opacity", Params::new().with("amount", 0.5));
        let out = r.execute("opacity", &[src], &params).unwrap();
        assert_eq!(out.sample(0, 0), [100, 50, 25, 128]);
    }

    #[test]
    fn crop_rejects_malformed_rect() {
        let r = reg();
        let src = Image::filled(Extent::sized(2, 2), [1, 1, 1, 255]).unwrap();
        let params = set(&r, "crop", Params::new().with("rect", vec![0.0, 0.0, 1.0]));
        let err = r.execute("crop", &[src], &params).unwrap_err();
        assert!(err.to_string().contains("crop"));
    }

    #[test]
    fn color_matrix_identity_is_a_noop() {
        let r = reg();
        let src = Image::filled(Extent::sized(1, 1), [100, 150, 200, 255]).unwrap();
        #[rustfmt::skip]
        let identity = vec![
            1.0, 0.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 1.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0, 0.0,
        ];
        let params = set(&r, "color_matrix", Params::new().with("matrix", identity));
        let out = r.execute("color_matrix", &[src.clone()], &params).unwrap();
        assert_eq!(out.sample(0, 0), src.sample(0, 0));
    }

    #[test]
    fn constant_color_premultiplies() {
        let r = reg();
        let params = set(
            &r,
            "constant_color",
            Params::new()
                .with("color", ColorValue::srgb(1.0, 0.0, 0.0, 0.5))
                .with("extent", [0.0, 0.0, 2.0, 2.0]),
        );
        let out = r.execute("constant_color", &[], &params).unwrap();
        assert_eq!(out.extent(), Extent::sized(2, 2));
        assert_eq!(out.sample(0, 0), [128, 0, 0, 128]);
    }

    #[test]
    fn blur_radius_cap_is_enforced() {
        let r = reg();
        let src = Image::filled(Extent::sized(1, 1), [0, 0, 0, 0]).unwrap();
        let params = set(&r, "box_blur", Params::new().with("radius", 10_000.0));
        assert!(r.execute("box_blur", &[src], &params).is_err());
    }
}
