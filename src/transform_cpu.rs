use kurbo::{Affine, Point};

use crate::{extent::Extent, image::Image};

/// Resample `src` through a 2-D affine map, nearest-neighbour.
///
/// The output extent is the bounding box of the source extent's corners
/// mapped through `matrix`; each output pixel center is pulled back through
/// the inverse map.
pub fn affine_transform(src: &Image, matrix: Affine) -> anyhow::Result<Image> {
    if matrix.determinant().abs() < 1e-12 {
        anyhow::bail!("affine matrix is not invertible");
    }
    let inverse = matrix.inverse();

    let extent = map_extent(src.extent(), matrix);
    if extent.is_empty() {
        return Ok(Image::from_rgba8_premul(Extent::EMPTY, Vec::new())?);
    }

    let mut data = Vec::with_capacity(extent.pixel_count() * 4);
    for y in extent.y..extent.max_y() {
        for x in extent.x..extent.max_x() {
            let p = inverse * Point::new(x as f64 + 0.5, y as f64 + 0.5);
            let px = src.sample(p.x.floor() as i64, p.y.floor() as i64);
            data.extend_from_slice(&px);
        }
    }
    Ok(Image::from_rgba8_premul(extent, data)?)
}

/// Restrict `src` to `rect`; the result's extent is the intersection.
pub fn crop(src: &Image, rect: Extent) -> anyhow::Result<Image> {
    let extent = src.extent().intersect(&rect);
    if extent.is_empty() {
        return Ok(Image::from_rgba8_premul(Extent::EMPTY, Vec::new())?);
    }
    Ok(Image::from_rgba8_premul(extent, src.read_region(extent))?)
}

/// Bounding box of an extent's corners under an affine map.
fn map_extent(extent: Extent, matrix: Affine) -> Extent {
    if extent.is_empty() {
        return Extent::EMPTY;
    }
    let corners = [
        Point::new(extent.x as f64, extent.y as f64),
        Point::new(extent.max_x() as f64, extent.y as f64),
        Point::new(extent.x as f64, extent.max_y() as f64),
        Point::new(extent.max_x() as f64, extent.max_y() as f64),
    ];
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for corner in corners {
        let p = matrix * corner;
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    let x = min_x.floor() as i64;
    let y = min_y.floor() as i64;
    let width = (max_x.ceil() as i64 - x).max(0) as u32;
    let height = (max_y.ceil() as i64 - y).max(0) as u32;
    Extent::new(x, y, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_moves_the_extent() {
        let src = Image::filled(Extent::sized(2, 2), [9, 9, 9, 255]).unwrap();
        let out = affine_transform(&src, Affine::translate((3.0, -1.0))).unwrap();
        assert_eq!(out.extent(), Extent::new(3, -1, 2, 2));
        assert_eq!(out.sample(3, -1), [9, 9, 9, 255]);
        assert_eq!(out.sample(0, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn scale_doubles_the_extent() {
        let src = Image::filled(Extent::sized(2, 2), [5, 5, 5, 255]).unwrap();
        let out = affine_transform(&src, Affine::scale(2.0)).unwrap();
        assert_eq!(out.extent(), Extent::sized(4, 4));
        assert_eq!(out.sample(3, 3), [5, 5, 5, 255]);
    }

    #[test]
    fn singular_matrix_is_rejected() {
        let src = Image::filled(Extent::sized(2, 2), [0, 0, 0, 0]).unwrap();
        assert!(affine_transform(&src, Affine::scale(0.0)).is_err());
    }

    #[test]
    fn crop_intersects_with_the_source_extent() {
        let src = Image::filled(Extent::sized(4, 4), [7, 7, 7, 255]).unwrap();
        let out = crop(&src, Extent::new(2, 2, 10, 10)).unwrap();
        assert_eq!(out.extent(), Extent::new(2, 2, 2, 2));
    }

    #[test]
    fn disjoint_crop_is_empty() {
        let src = Image::filled(Extent::sized(2, 2), [7, 7, 7, 255]).unwrap();
        let out = crop(&src, Extent::new(10, 10, 2, 2)).unwrap();
        assert!(out.extent().is_empty());
    }
}
