//! Fill measurement for canonical regions through a fitted transform.
//!
//! Both the bubble decision engine and the identifier decoder measure how
//! much ink sits inside a sheet-space square; the sampler lives here so the
//! two stages cannot diverge on the measurement definition.

use image::GrayImage;

use crate::capture::FOREGROUND;
use crate::layout::Region;
use crate::registrar::transform::SheetTransform;

/// Fraction of foreground pixels inside `region`, sampled on an
/// `n x n` canonical grid projected through `transform`.
///
/// Samples that land outside the image count as background; a region
/// projected fully off-image therefore scores 0.0.
pub fn region_fill_score(
    binary: &GrayImage,
    transform: &SheetTransform,
    region: &Region,
    samples_per_axis: usize,
) -> f32 {
    let n = samples_per_axis.max(1);
    let (w, h) = binary.dimensions();
    let mut hits = 0usize;

    for iy in 0..n {
        let fy = 2.0 * (iy as f64 + 0.5) / n as f64 - 1.0;
        let sy = region.center[1] + fy * region.half;
        for ix in 0..n {
            let fx = 2.0 * (ix as f64 + 0.5) / n as f64 - 1.0;
            let sx = region.center[0] + fx * region.half;
            let [px, py] = transform.project(sx, sy);
            if !px.is_finite() || !py.is_finite() {
                continue;
            }
            let xi = px.round();
            let yi = py.round();
            if xi < 0.0 || yi < 0.0 || xi >= w as f64 || yi >= h as f64 {
                continue;
            }
            if binary.get_pixel(xi as u32, yi as u32)[0] == FOREGROUND {
                hits += 1;
            }
        }
    }

    hits as f32 / (n * n) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Region;
    use image::Luma;

    fn identity_transform() -> SheetTransform {
        SheetTransform::from_matrix(nalgebra::Matrix3::identity())
    }

    #[test]
    fn full_region_scores_one() {
        let binary = GrayImage::from_pixel(64, 64, Luma([FOREGROUND]));
        let region = Region {
            center: [32.0, 32.0],
            half: 10.0,
        };
        let score = region_fill_score(&binary, &identity_transform(), &region, 8);
        assert_eq!(score, 1.0);
    }

    #[test]
    fn empty_region_scores_zero() {
        let binary = GrayImage::new(64, 64);
        let region = Region {
            center: [32.0, 32.0],
            half: 10.0,
        };
        let score = region_fill_score(&binary, &identity_transform(), &region, 8);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn off_image_region_scores_zero() {
        let binary = GrayImage::from_pixel(64, 64, Luma([FOREGROUND]));
        let region = Region {
            center: [500.0, 500.0],
            half: 10.0,
        };
        let score = region_fill_score(&binary, &identity_transform(), &region, 8);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn half_filled_region_scores_near_half() {
        let mut binary = GrayImage::new(64, 64);
        for y in 0..64 {
            for x in 0..32 {
                binary.put_pixel(x, y, Luma([FOREGROUND]));
            }
        }
        let region = Region {
            center: [32.0, 32.0],
            half: 16.0,
        };
        let score = region_fill_score(&binary, &identity_transform(), &region, 16);
        assert!((score - 0.5).abs() < 0.1, "score = {}", score);
    }
}
