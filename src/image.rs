use std::sync::Arc;

use crate::{
    error::{FiltraError, FiltraResult},
    extent::Extent,
};

/// Pixel layouts the engine understands.
///
/// Everything is **premultiplied alpha** RGBA8; the variant exists so the
/// contract is explicit at API boundaries and room is left for more formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba8Premul,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgba8Premul => 4,
        }
    }
}

/// An immutable image handle: decoded pixels placed at an extent in working
/// space.
///
/// The buffer is shared (`Arc`), so cloning an `Image` is cheap and pipelines
/// holding the same source share one allocation. Pixels outside the extent
/// read as transparent black; filters treat images as defined on an
/// unbounded plane.
///
/// The engine does not decode or encode file formats; callers construct
/// images from pixel data they obtained elsewhere.
#[derive(Clone, Debug)]
pub struct Image {
    extent: Extent,
    format: PixelFormat,
    data: Arc<Vec<u8>>,
}

impl Image {
    /// Wrap a tightly packed, row-major premultiplied RGBA8 buffer.
    pub fn from_rgba8_premul(extent: Extent, data: Vec<u8>) -> FiltraResult<Image> {
        let expected = extent
            .pixel_count()
            .checked_mul(PixelFormat::Rgba8Premul.bytes_per_pixel())
            .ok_or_else(|| FiltraError::InvalidImage("image buffer size overflow".to_string()))?;
        if data.len() != expected {
            return Err(FiltraError::InvalidImage(format!(
                "buffer length {} does not match extent {}x{} (expected {expected})",
                data.len(),
                extent.width,
                extent.height
            )));
        }
        Ok(Image {
            extent,
            format: PixelFormat::Rgba8Premul,
            data: Arc::new(data),
        })
    }

    /// A solid-color image covering `extent`.
    pub fn filled(extent: Extent, rgba: [u8; 4]) -> FiltraResult<Image> {
        let mut data = Vec::with_capacity(extent.pixel_count() * 4);
        for _ in 0..extent.pixel_count() {
            data.extend_from_slice(&rgba);
        }
        Image::from_rgba8_premul(extent, data)
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Row-major pixel bytes for the extent.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.extent.width as usize * self.format.bytes_per_pixel()
    }

    /// Read the pixel at working-space coordinates, transparent outside the
    /// extent.
    pub fn sample(&self, x: i64, y: i64) -> [u8; 4] {
        if !self.extent.contains(x, y) {
            return [0, 0, 0, 0];
        }
        let ix = (x - self.extent.x) as usize;
        let iy = (y - self.extent.y) as usize;
        let idx = (iy * self.extent.width as usize + ix) * 4;
        [
            self.data[idx],
            self.data[idx + 1],
            self.data[idx + 2],
            self.data[idx + 3],
        ]
    }

    /// Copy the region `target` (working-space) into a fresh tightly packed
    /// buffer, transparent where the image is not defined.
    pub fn read_region(&self, target: Extent) -> Vec<u8> {
        let mut out = vec![0u8; target.pixel_count() * 4];
        let overlap = self.extent.intersect(&target);
        if overlap.is_empty() {
            return out;
        }
        let src_stride = self.stride();
        let dst_stride = target.width as usize * 4;
        for row in 0..overlap.height as usize {
            let sy = (overlap.y - self.extent.y) as usize + row;
            let sx = (overlap.x - self.extent.x) as usize;
            let dy = (overlap.y - target.y) as usize + row;
            let dx = (overlap.x - target.x) as usize;
            let src_off = sy * src_stride + sx * 4;
            let dst_off = dy * dst_stride + dx * 4;
            let len = overlap.width as usize * 4;
            out[dst_off..dst_off + len].copy_from_slice(&self.data[src_off..src_off + len]);
        }
        out
    }
}
