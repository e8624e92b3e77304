//! Capture normalization: raw camera bytes → calibrated gray + binary images.
//!
//! Binarization runs Gaussian smoothing (sensor-noise suppression) followed
//! by Otsu thresholding with inverted polarity, so pen and pencil marks end
//! up as foreground. The threshold is recomputed from every image's
//! histogram; classroom lighting varies too much for a fixed level.

use image::GrayImage;

/// Foreground value in binary images (ink).
pub const FOREGROUND: u8 = 255;

/// Configuration for capture normalization.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Gaussian sigma applied before thresholding (pixels).
    /// Default: [`NormalizeConfig::DEFAULT_BLUR_SIGMA`].
    pub blur_sigma: f32,
    /// Minimum accepted capture side length (pixels).
    /// Default: [`NormalizeConfig::DEFAULT_MIN_SIDE`].
    pub min_side: u32,
    /// Intensity span below which the capture is treated as markless.
    ///
    /// Otsu splits any histogram, including a blank one; a capture whose
    /// intensity range is narrower than this produces an all-background
    /// binary image instead of arbitrary speckle.
    /// Default: [`NormalizeConfig::DEFAULT_MIN_CONTRAST`].
    pub min_contrast: u8,
}

impl NormalizeConfig {
    pub const DEFAULT_BLUR_SIGMA: f32 = 1.2;
    pub const DEFAULT_MIN_SIDE: u32 = 200;
    pub const DEFAULT_MIN_CONTRAST: u8 = 16;
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            blur_sigma: Self::DEFAULT_BLUR_SIGMA,
            min_side: Self::DEFAULT_MIN_SIDE,
            min_contrast: Self::DEFAULT_MIN_CONTRAST,
        }
    }
}

/// Grayscale and binary views of one capture.
///
/// `binary` holds [`FOREGROUND`] where ink was detected and 0 elsewhere.
#[derive(Debug, Clone)]
pub struct NormalizedCapture {
    pub gray: GrayImage,
    pub binary: GrayImage,
}

impl NormalizedCapture {
    /// Capture dimensions `[width, height]`.
    pub fn dimensions(&self) -> [u32; 2] {
        let (w, h) = self.gray.dimensions();
        [w, h]
    }
}

/// Decode a raw capture buffer (JPEG/PNG/...) and normalize it.
pub fn decode_capture(
    bytes: &[u8],
    config: &NormalizeConfig,
) -> Result<NormalizedCapture, crate::error::DecodeError> {
    let gray = image::load_from_memory(bytes)?.to_luma8();
    let (w, h) = gray.dimensions();
    if w < config.min_side || h < config.min_side {
        return Err(crate::error::DecodeError::ImageTooSmall {
            width: w,
            height: h,
            min_side: config.min_side,
        });
    }
    Ok(normalize_gray(&gray, config))
}

/// Normalize an already-decoded grayscale image.
pub fn normalize_gray(gray: &GrayImage, config: &NormalizeConfig) -> NormalizedCapture {
    let smoothed = if config.blur_sigma > 0.0 {
        imageproc::filter::gaussian_blur_f32(gray, config.blur_sigma)
    } else {
        gray.clone()
    };

    let (w, h) = smoothed.dimensions();
    let mut binary = GrayImage::new(w, h);

    let (mut lo, mut hi) = (u8::MAX, u8::MIN);
    for p in smoothed.as_raw() {
        lo = lo.min(*p);
        hi = hi.max(*p);
    }
    if hi.saturating_sub(lo) < config.min_contrast {
        // Markless capture: nothing to threshold.
        return NormalizedCapture {
            gray: gray.clone(),
            binary,
        };
    }

    let level = imageproc::contrast::otsu_level(&smoothed);
    let dst: &mut [u8] = &mut binary;
    for (out, src) in dst.iter_mut().zip(smoothed.as_raw()) {
        *out = if *src <= level { FOREGROUND } else { 0 };
    }

    NormalizedCapture {
        gray: gray.clone(),
        binary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn image_with_dark_square(w: u32, h: u32) -> GrayImage {
        let mut img = GrayImage::from_pixel(w, h, Luma([230u8]));
        for y in 80..120 {
            for x in 80..120 {
                img.put_pixel(x, y, Luma([25u8]));
            }
        }
        img
    }

    #[test]
    fn ink_becomes_foreground() {
        let img = image_with_dark_square(256, 256);
        let cap = normalize_gray(&img, &NormalizeConfig::default());
        assert_eq!(cap.binary.get_pixel(100, 100)[0], FOREGROUND);
        assert_eq!(cap.binary.get_pixel(10, 10)[0], 0);
    }

    #[test]
    fn flat_capture_has_no_foreground() {
        let img = GrayImage::from_pixel(256, 256, Luma([200u8]));
        let cap = normalize_gray(&img, &NormalizeConfig::default());
        assert!(cap.binary.as_raw().iter().all(|&p| p == 0));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let err = decode_capture(b"definitely not an image", &NormalizeConfig::default())
            .expect_err("expected decode failure");
        assert!(matches!(err, crate::error::DecodeError::InvalidImage(_)));
    }

    #[test]
    fn undersized_capture_is_rejected() {
        let img = image_with_dark_square(256, 256);
        let small = image::imageops::resize(&img, 64, 64, image::imageops::FilterType::Nearest);
        let mut bytes = Vec::new();
        small
            .write_to(
                &mut std::io::Cursor::new(&mut bytes),
                image::ImageFormat::Png,
            )
            .expect("encode png");
        let err =
            decode_capture(&bytes, &NormalizeConfig::default()).expect_err("expected size gate");
        assert!(matches!(
            err,
            crate::error::DecodeError::ImageTooSmall { .. }
        ));
    }
}
